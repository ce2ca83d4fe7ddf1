//! Admin resources and their REST paths

use clap::ValueEnum;

use super::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Resource {
    Orders,
    Products,
    Categories,
    Stores,
    Users,
    Customers,
    #[value(name = "content")]
    ContentPages,
    Shipping,
    Payment,
    #[value(name = "tax-classes")]
    TaxClasses,
    #[value(name = "tax-rates")]
    TaxRates,
}

impl Resource {
    /// Collection path; items live at `{path}/{id}`.
    pub fn path(self) -> &'static str {
        match self {
            Self::Orders => "/v1/private/orders",
            Self::Products => "/v1/private/products",
            Self::Categories => "/v1/private/categories",
            Self::Stores => "/v1/private/stores",
            Self::Users => "/v1/private/users",
            Self::Customers => "/v1/private/customers",
            Self::ContentPages => "/v1/private/content/pages",
            Self::Shipping => "/v1/private/shipping/packages",
            Self::Payment => "/v1/private/modules/payment",
            Self::TaxClasses => "/v1/private/tax/class",
            Self::TaxRates => "/v1/private/tax/rates",
        }
    }

    /// Stores are the tenants themselves, so they are not filtered by one.
    pub fn store_scoped(self) -> bool {
        !matches!(self, Self::Stores)
    }

    pub fn item_path(self, id: &str) -> Result<String, ApiError> {
        if id.is_empty() || id.contains(['/', '?', '#']) {
            return Err(ApiError::InvalidUrl(format!("bad id {:?}", id)));
        }
        Ok(format!("{}/{}", self.path(), id))
    }
}
