use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use rotu_core::documents::{QuotationLine, SaleLine};
use rotu_core::domain::client::{Client, ClientId, ClientInput, ClientStats};
use rotu_core::domain::expense::{Expense, ExpenseId, ExpenseInput};
use rotu_core::domain::inventory::{
    Category, CategoryId, CategoryInput, Product, ProductId, ProductInput, StockMovement,
    StockMovementId, StockMovementInput,
};
use rotu_core::domain::quotation::{
    Quotation, QuotationDraft, QuotationId, QuotationItem, QuotationItemId, QuotationStatus,
};
use rotu_core::domain::sale::{Sale, SaleDraft, SaleFromQuotation, SaleId, SaleItem, SaleItemId};
use rotu_core::domain::simple_inventory::{
    SimpleMovement, SimpleMovementId, SimpleMovementInput, SimpleProduct, SimpleProductId,
    SimpleProductInput, StockAdjustment,
};
use rotu_core::domain::user::{NewUser, User, UserId};
use rotu_core::errors::{ApplicationError, DomainError};
use rotu_core::reports::{QuotationFact, SaleFact, SaleItemFact};

pub(crate) mod codec;

pub mod client;
pub mod expense;
pub mod inventory;
pub mod quotation;
pub mod report;
pub mod sale;
pub mod simple_inventory;
pub mod user;

pub use client::{ClientFilter, SqlClientRepository};
pub use expense::{ExpenseFilter, SqlExpenseRepository};
pub use inventory::{MovementFilter, ProductFilter, SqlInventoryRepository};
pub use quotation::{QuotationFilter, SqlQuotationRepository};
pub use report::{DateRange, SqlReportRepository};
pub use sale::{SaleFilter, SqlSaleRepository};
pub use simple_inventory::{SimpleMovementFilter, SimpleProductFilter, SqlSimpleInventoryRepository};
pub use user::{SqlUserRepository, UserCredentials, UserFilter};

/// Attempts at allocating a document number before giving up with a conflict.
pub const MAX_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} {id} was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if codec::is_unique_violation(&error) {
            return Self::Conflict("a record with the same unique value already exists".to_string());
        }
        if codec::is_foreign_key_violation(&error) {
            return Self::Conflict("the record is referenced by other records".to_string());
        }
        if codec::is_busy(&error) {
            return Self::Conflict("the database is busy with another write; retry the request".to_string());
        }
        Self::Database(error)
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Domain(domain) => Self::Domain(domain),
            RepositoryError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepositoryError::Conflict(message) => Self::Conflict(message),
            other @ (RepositoryError::Database(_) | RepositoryError::Decode(_)) => {
                Self::Persistence(other.to_string())
            }
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &NewUser, password_hash: &str) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_credentials(
        &self,
        username: &str,
    ) -> Result<Option<UserCredentials>, RepositoryError>;
    async fn password_hash(&self, id: UserId) -> Result<Option<String>, RepositoryError>;
    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, RepositoryError>;
    async fn update(&self, user: &User) -> Result<User, RepositoryError>;
    async fn set_password(&self, id: UserId, password_hash: &str) -> Result<(), RepositoryError>;
    async fn delete(&self, id: UserId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn create(&self, input: &ClientInput) -> Result<Client, RepositoryError>;
    async fn find_by_id(&self, id: ClientId) -> Result<Option<Client>, RepositoryError>;
    async fn list(&self, filter: &ClientFilter) -> Result<Vec<Client>, RepositoryError>;
    async fn update(&self, id: ClientId, input: &ClientInput) -> Result<Client, RepositoryError>;
    /// Refuses with a conflict while quotations or sales reference the client.
    async fn delete(&self, id: ClientId) -> Result<(), RepositoryError>;
    async fn stats(&self, id: ClientId) -> Result<ClientStats, RepositoryError>;
}

#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn create_category(&self, input: &CategoryInput) -> Result<Category, RepositoryError>;
    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError>;
    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError>;
    async fn update_category(
        &self,
        id: CategoryId,
        input: &CategoryInput,
    ) -> Result<Category, RepositoryError>;
    async fn delete_category(&self, id: CategoryId) -> Result<(), RepositoryError>;

    async fn create_product(&self, input: &ProductInput) -> Result<Product, RepositoryError>;
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError>;
    /// Leaves `quantity_available` untouched; stock only changes through movements.
    async fn update_product(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError>;
    async fn deactivate_product(&self, id: ProductId) -> Result<(), RepositoryError>;

    /// Inserts the movement and applies it to the product in one transaction.
    async fn record_movement(
        &self,
        input: &StockMovementInput,
        created_by: Option<UserId>,
    ) -> Result<StockMovement, RepositoryError>;
    async fn find_movement(
        &self,
        id: StockMovementId,
    ) -> Result<Option<StockMovement>, RepositoryError>;
    async fn list_movements(
        &self,
        filter: &MovementFilter,
    ) -> Result<Vec<StockMovement>, RepositoryError>;
}

#[async_trait]
pub trait SimpleInventoryRepository: Send + Sync {
    async fn create_product(
        &self,
        input: &SimpleProductInput,
        created_by: Option<UserId>,
    ) -> Result<SimpleProduct, RepositoryError>;
    async fn find_product(
        &self,
        id: SimpleProductId,
    ) -> Result<Option<SimpleProduct>, RepositoryError>;
    async fn list_products(
        &self,
        filter: &SimpleProductFilter,
    ) -> Result<Vec<SimpleProduct>, RepositoryError>;
    async fn update_product(
        &self,
        id: SimpleProductId,
        input: &SimpleProductInput,
    ) -> Result<SimpleProduct, RepositoryError>;
    async fn delete_product(&self, id: SimpleProductId) -> Result<(), RepositoryError>;

    async fn record_movement(
        &self,
        input: &SimpleMovementInput,
        created_by: Option<UserId>,
    ) -> Result<SimpleMovement, RepositoryError>;
    async fn adjust_stock(
        &self,
        id: SimpleProductId,
        adjustment: &StockAdjustment,
        created_by: Option<UserId>,
    ) -> Result<(SimpleProduct, SimpleMovement), RepositoryError>;
    async fn find_movement(
        &self,
        id: SimpleMovementId,
    ) -> Result<Option<SimpleMovement>, RepositoryError>;
    async fn list_movements(
        &self,
        filter: &SimpleMovementFilter,
    ) -> Result<Vec<SimpleMovement>, RepositoryError>;
}

#[async_trait]
pub trait QuotationRepository: Send + Sync {
    /// Allocates the next `COT-` number and stores the quotation with its items.
    async fn create(
        &self,
        draft: &QuotationDraft,
        created_by: Option<UserId>,
    ) -> Result<Quotation, RepositoryError>;
    async fn find_by_id(&self, id: QuotationId) -> Result<Option<Quotation>, RepositoryError>;
    async fn list(&self, filter: &QuotationFilter) -> Result<Vec<Quotation>, RepositoryError>;
    /// Replaces header, items and totals.
    async fn update(
        &self,
        id: QuotationId,
        draft: &QuotationDraft,
    ) -> Result<Quotation, RepositoryError>;
    async fn transition(
        &self,
        id: QuotationId,
        next: QuotationStatus,
    ) -> Result<Quotation, RepositoryError>;
    async fn delete(&self, id: QuotationId) -> Result<(), RepositoryError>;
    /// Numbers of the quotations that were deleted.
    async fn delete_many(&self, ids: &[QuotationId]) -> Result<Vec<String>, RepositoryError>;

    async fn find_item(&self, id: QuotationItemId)
        -> Result<Option<QuotationItem>, RepositoryError>;
    async fn list_items(
        &self,
        quotation_id: Option<QuotationId>,
    ) -> Result<Vec<QuotationItem>, RepositoryError>;
    /// Item writes recompute the parent quotation in the same transaction.
    async fn add_item(
        &self,
        quotation_id: QuotationId,
        line: &QuotationLine,
    ) -> Result<QuotationItem, RepositoryError>;
    async fn update_item(
        &self,
        id: QuotationItemId,
        line: &QuotationLine,
    ) -> Result<QuotationItem, RepositoryError>;
    async fn delete_item(&self, id: QuotationItemId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SaleRepository: Send + Sync {
    /// Allocates the next `FAC-` number and stores the sale with its items.
    async fn create(
        &self,
        draft: &SaleDraft,
        created_by: Option<UserId>,
    ) -> Result<Sale, RepositoryError>;
    /// Creates the sale and marks the quotation converted in one transaction.
    async fn create_from_quotation(
        &self,
        request: &SaleFromQuotation,
        default_tax_rate: Decimal,
        created_by: Option<UserId>,
    ) -> Result<Sale, RepositoryError>;
    async fn find_by_id(&self, id: SaleId) -> Result<Option<Sale>, RepositoryError>;
    async fn list(&self, filter: &SaleFilter) -> Result<Vec<Sale>, RepositoryError>;
    async fn update(&self, id: SaleId, draft: &SaleDraft) -> Result<Sale, RepositoryError>;
    /// Completes the sale, records one stock exit per consuming line and marks the
    /// originating quotation converted.
    async fn complete(
        &self,
        id: SaleId,
        completed_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Sale, RepositoryError>;
    async fn cancel(&self, id: SaleId) -> Result<Sale, RepositoryError>;
    async fn delete(&self, id: SaleId) -> Result<(), RepositoryError>;
    /// Invoice numbers of the sales that were deleted.
    async fn delete_many(&self, ids: &[SaleId]) -> Result<Vec<String>, RepositoryError>;

    async fn find_item(&self, id: SaleItemId) -> Result<Option<SaleItem>, RepositoryError>;
    async fn list_items(&self, sale_id: Option<SaleId>) -> Result<Vec<SaleItem>, RepositoryError>;
    async fn add_item(&self, sale_id: SaleId, line: &SaleLine) -> Result<SaleItem, RepositoryError>;
    async fn update_item(&self, id: SaleItemId, line: &SaleLine)
        -> Result<SaleItem, RepositoryError>;
    async fn delete_item(&self, id: SaleItemId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    async fn create(
        &self,
        input: &ExpenseInput,
        created_by: Option<UserId>,
    ) -> Result<Expense, RepositoryError>;
    async fn find_by_id(&self, id: ExpenseId) -> Result<Option<Expense>, RepositoryError>;
    async fn list(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>, RepositoryError>;
    async fn update(&self, id: ExpenseId, input: &ExpenseInput)
        -> Result<Expense, RepositoryError>;
    async fn delete(&self, id: ExpenseId) -> Result<(), RepositoryError>;
    async fn delete_many(&self, ids: &[ExpenseId]) -> Result<u64, RepositoryError>;
}

/// Raw rows for the report aggregations in `rotu_core::reports`.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn sale_facts(&self) -> Result<Vec<SaleFact>, RepositoryError>;
    async fn completed_sale_facts(&self, range: &DateRange)
        -> Result<Vec<SaleFact>, RepositoryError>;
    async fn completed_item_facts(
        &self,
        range: &DateRange,
    ) -> Result<Vec<SaleItemFact>, RepositoryError>;
    async fn quotation_facts(&self) -> Result<Vec<QuotationFact>, RepositoryError>;
}
