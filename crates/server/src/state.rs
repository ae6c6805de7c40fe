use std::sync::Arc;

use rotu_core::config::AppConfig;
use rotu_db::repositories::{
    SqlClientRepository, SqlExpenseRepository, SqlInventoryRepository, SqlQuotationRepository,
    SqlReportRepository, SqlSaleRepository, SqlSimpleInventoryRepository, SqlUserRepository,
};
use rotu_db::DbPool;
use rust_decimal::Decimal;

use crate::auth::JwtManager;
use crate::pdf::PdfGenerator;

/// Shared by every handler. Repositories are cheap pool handles built per request.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtManager>,
    pub pdf: Arc<PdfGenerator>,
}

impl AppState {
    pub fn new(pool: DbPool, config: AppConfig, pdf: PdfGenerator) -> Self {
        let jwt = JwtManager::from_config(&config.auth);
        Self { pool, config: Arc::new(config), jwt: Arc::new(jwt), pdf: Arc::new(pdf) }
    }

    pub fn users(&self) -> SqlUserRepository {
        SqlUserRepository::new(self.pool.clone())
    }

    pub fn clients(&self) -> SqlClientRepository {
        SqlClientRepository::new(self.pool.clone())
    }

    pub fn inventory(&self) -> SqlInventoryRepository {
        SqlInventoryRepository::new(self.pool.clone())
    }

    pub fn simple_inventory(&self) -> SqlSimpleInventoryRepository {
        SqlSimpleInventoryRepository::new(self.pool.clone())
    }

    pub fn quotations(&self) -> SqlQuotationRepository {
        SqlQuotationRepository::new(self.pool.clone())
    }

    pub fn sales(&self) -> SqlSaleRepository {
        SqlSaleRepository::new(self.pool.clone())
    }

    pub fn expenses(&self) -> SqlExpenseRepository {
        SqlExpenseRepository::new(self.pool.clone())
    }

    pub fn reports(&self) -> SqlReportRepository {
        SqlReportRepository::new(self.pool.clone())
    }

    pub fn default_tax_rate(&self) -> Decimal {
        self.config.business.default_tax_rate
    }

    pub fn currency(&self) -> &str {
        &self.config.business.currency_symbol
    }
}
