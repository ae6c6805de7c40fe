pub mod config;
pub mod credentials;
pub mod documents;
pub mod domain;
pub mod errors;
pub mod permissions;
pub mod reports;
pub mod stock;

pub use documents::{compute_totals, DocumentSeries, DocumentTotals, SkuSeries};
pub use domain::client::{Client, ClientId};
pub use domain::expense::{Expense, ExpenseId};
pub use domain::inventory::{Category, CategoryId, Product, ProductId};
pub use domain::quotation::{Quotation, QuotationId, QuotationStatus};
pub use domain::sale::{PaymentMethod, Sale, SaleId, SaleStatus};
pub use domain::user::{Role, User, UserId};
pub use errors::{ApplicationError, DomainError, FieldErrors, InterfaceError};
pub use permissions::Capability;
