use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account approval state, controlled by administrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Active,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(AccountStatus::Pending),
            "active" => Some(AccountStatus::Active),
            "suspended" => Some(AccountStatus::Suspended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Standard,
    Admin,
    Vip,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Standard => "standard",
            AccountKind::Admin => "admin",
            AccountKind::Vip => "vip",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "standard" => Some(AccountKind::Standard),
            "admin" => Some(AccountKind::Admin),
            "vip" => Some(AccountKind::Vip),
            _ => None,
        }
    }
}

/// Lifecycle event produced by a status change. Each maps to exactly one
/// notification kind; transitions not listed here stay silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    Activated,
    Suspended,
    Reactivated,
}

/// Compute the lifecycle event for a status change, if any.
///
/// This replaces save-hook signal handling: the admin use case calls it
/// explicitly with the previous and the new status, so unrelated field
/// updates can never fire an email.
pub fn status_transition(prev: AccountStatus, new: AccountStatus) -> Option<StatusEvent> {
    match (prev, new) {
        (AccountStatus::Pending, AccountStatus::Active) => Some(StatusEvent::Activated),
        (AccountStatus::Active, AccountStatus::Suspended) => Some(StatusEvent::Suspended),
        (AccountStatus::Suspended, AccountStatus::Active) => Some(StatusEvent::Reactivated),
        _ => None,
    }
}

/// The authenticated principal as consumed by the engines. Provisioned by
/// the external identity provider; the engines only read it.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub email: String,
    pub kind: AccountKind,
    pub status: AccountStatus,
    pub referral_code: Option<String>,
    pub has_used_referral: bool,
    pub activation_notified: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn is_admin(&self) -> bool {
        self.kind == AccountKind::Admin
    }
}
