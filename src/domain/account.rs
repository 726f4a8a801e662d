use {
    super::{
        error::PipelineError,
        id::{ProductId, UserId},
        money::MoneyAmount,
    },
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    /// Course provider.
    Nutri,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Nutri => "nutri",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Role {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "client" => Ok(Self::Client),
            "nutri" => Ok(Self::Nutri),
            "admin" => Ok(Self::Admin),
            other => Err(PipelineError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// The slice of a user profile this service reads and writes.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: UserId,
    pub role: Role,
    pub balance: MoneyAmount,
    pub payout_amount: MoneyAmount,
}

/// Course as seen by the payment flow: who gets paid, and how much.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub provider: UserId,
    pub title: String,
    /// Amount the provider receives per sale.
    pub net_price: MoneyAmount,
}
