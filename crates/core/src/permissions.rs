use crate::domain::user::Role;
use crate::errors::ApplicationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Clients, quotations, sales, expenses and stock movements.
    OperateSales,
    /// Hard deletes of documents and expenses, including bulk deletes.
    DeleteRecords,
    ManageUsers,
    ViewCatalog,
    EditCatalog,
    ViewSimpleInventory,
    EditSimpleInventory,
    ViewReports,
}

impl Capability {
    pub fn describe(self) -> &'static str {
        match self {
            Self::OperateSales => "operate sales documents",
            Self::DeleteRecords => "delete records",
            Self::ManageUsers => "manage users",
            Self::ViewCatalog => "view the catalogue",
            Self::EditCatalog => "edit the catalogue",
            Self::ViewSimpleInventory => "view the manual inventory",
            Self::EditSimpleInventory => "edit the manual inventory",
            Self::ViewReports => "view reports",
        }
    }
}

impl Role {
    pub fn allows(self, capability: Capability) -> bool {
        match capability {
            Capability::DeleteRecords | Capability::ManageUsers => self == Role::Admin,
            Capability::OperateSales | Capability::EditSimpleInventory => {
                matches!(self, Role::Admin | Role::Seller)
            }
            Capability::ViewCatalog
            | Capability::EditCatalog
            | Capability::ViewSimpleInventory
            | Capability::ViewReports => true,
        }
    }

    pub fn require(self, capability: Capability) -> Result<(), ApplicationError> {
        if self.allows(capability) {
            Ok(())
        } else {
            Err(ApplicationError::PermissionDenied(format!(
                "role {} may not {}",
                self.as_str(),
                capability.describe()
            )))
        }
    }
}
