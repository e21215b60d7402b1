//! User account document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ItemId, UserId};

/// A registered user.
///
/// The balance is only debited by packet purchases and only credited by
/// card sales and coin redemption. It never exceeds the configured cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub nickname: String,
    pub email: String,
    /// Opaque hash produced by the authentication collaborator.
    pub password_hash: String,
    /// Coins.
    pub balance: u32,
    pub favorite_item: Option<ItemId>,
    pub registered_at: DateTime<Utc>,
}

impl User {
    /// A new account with a zero balance.
    #[must_use]
    pub fn new(
        nickname: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: UserId::new(),
            nickname: nickname.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            balance: 0,
            favorite_item: None,
            registered_at: Utc::now(),
        }
    }

    /// Whether the user can pay `price`.
    #[must_use]
    pub fn can_afford(&self, price: u32) -> bool {
        self.balance >= price
    }

    /// Deterministic fixture user with the given balance.
    #[cfg(any(test, feature = "test-helpers"))]
    #[must_use]
    pub fn dummy(balance: u32) -> Self {
        let mut user = Self::new("tester", "tester@example.com", "argon2$dummy");
        user.balance = balance;
        user
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_starts_empty() {
        let user = User::new("peter", "peter@example.com", "hash");
        assert_eq!(user.balance, 0);
        assert!(user.favorite_item.is_none());
        assert!(!user.can_afford(1));
    }

    #[test]
    fn can_afford_at_exact_balance() {
        let user = User::dummy(3);
        assert!(user.can_afford(3));
        assert!(!user.can_afford(4));
    }
}
