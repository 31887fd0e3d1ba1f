use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::text_enum;

text_enum! {
    /// Role of a user inside a company
    pub enum MemberRole {
        Owner => "owner",
        Admin => "admin",
        Member => "member",
    }
}

impl MemberRole {
    fn rank(&self) -> u8 {
        match self {
            MemberRole::Owner => 3,
            MemberRole::Admin => 2,
            MemberRole::Member => 1,
        }
    }

    /// True when this role grants at least the privileges of `required`
    pub fn at_least(&self, required: MemberRole) -> bool {
        self.rank() >= required.rank()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub siret: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub subscription_status: Option<String>,
    pub plan: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Membership {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

/// Membership joined with the member's identity, for team listings
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TeamMember {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Invitation {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub role: MemberRole,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub invited_by: Uuid,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering() {
        assert!(MemberRole::Owner.at_least(MemberRole::Admin));
        assert!(MemberRole::Admin.at_least(MemberRole::Admin));
        assert!(!MemberRole::Member.at_least(MemberRole::Admin));
        assert!(MemberRole::Member.at_least(MemberRole::Member));
    }

    #[test]
    fn role_parses_from_text() {
        assert_eq!("admin".parse::<MemberRole>(), Ok(MemberRole::Admin));
        assert!("superuser".parse::<MemberRole>().is_err());
        assert_eq!(MemberRole::Owner.to_string(), "owner");
    }
}
