//! Account and album operations around the core engine.
//!
//! Balance rules:
//! - Packets debit (see [`PacketGenerator`](crate::PacketGenerator)).
//! - Sales and coin redemption credit, never past `max_balance`.
//!
//! Selling a card and deleting an account retire copies, so both
//! decrement the supply ledger in the same transaction.

use std::collections::BTreeSet;

use cardex_store::CollectionStore;
use cardex_types::{Album, CardexError, ItemId, Result, User, UserId, constants};
use serde::{Deserialize, Serialize};

use crate::{conservation, context::EngineContext};

/// Input of [`Accounts::register`]. The password is already hashed by the
/// authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub nickname: String,
    pub email: String,
    pub password_hash: String,
}

impl Registration {
    fn validate(&self) -> Result<()> {
        if self.nickname.trim().chars().count() < constants::MIN_NICKNAME_LEN {
            return Err(CardexError::InvalidRequest {
                reason: format!(
                    "nickname must be at least {} characters",
                    constants::MIN_NICKNAME_LEN
                ),
            });
        }
        if !self.email.contains('@') {
            return Err(CardexError::InvalidRequest {
                reason: "email address is malformed".into(),
            });
        }
        if self.password_hash.is_empty() {
            return Err(CardexError::InvalidRequest {
                reason: "password hash is empty".into(),
            });
        }
        Ok(())
    }
}

/// What [`Accounts::delete_account`] removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AccountRemoval {
    pub trades_removed: usize,
    pub cards_retired: usize,
}

/// Registration, album reads, sales and account lifecycle.
#[derive(Debug)]
pub struct Accounts<S> {
    ctx: EngineContext<S>,
}

impl<S: CollectionStore> Accounts<S> {
    #[must_use]
    pub fn new(ctx: EngineContext<S>) -> Self {
        Self { ctx }
    }

    /// Create a user with a zero balance and an empty album.
    ///
    /// # Errors
    /// `InvalidRequest` on malformed input, `AlreadyRegistered` if the email
    /// or nickname is taken, or a storage error.
    pub fn register(&self, registration: &Registration) -> Result<UserId> {
        registration.validate()?;
        let nickname = registration.nickname.trim();
        let email = registration.email.trim().to_lowercase();

        let id = self.ctx.transact(|tx| {
            if tx.find_user(|u| u.email == email).is_some() {
                return Err(CardexError::AlreadyRegistered {
                    field: "email".into(),
                });
            }
            if tx.find_user(|u| u.nickname == nickname).is_some() {
                return Err(CardexError::AlreadyRegistered {
                    field: "nickname".into(),
                });
            }
            let user = User::new(nickname, email.clone(), registration.password_hash.clone());
            let id = user.id;
            tx.put_user(user);
            if tx.album(id).is_none() {
                tx.put_album(Album::new(id));
            }
            Ok(id)
        })?;

        tracing::info!(user = %id, nickname, "User registered");
        Ok(id)
    }

    /// Create the user's album unless it exists. Returns whether it was created.
    ///
    /// # Errors
    /// `UserNotFound` or a storage error.
    pub fn ensure_album(&self, user: UserId) -> Result<bool> {
        let created = self.ctx.transact(|tx| {
            if tx.user(user).is_none() {
                return Err(CardexError::UserNotFound(user));
            }
            if tx.album(user).is_some() {
                return Ok(false);
            }
            tx.put_album(Album::new(user));
            Ok(true)
        })?;
        if created {
            tracing::info!(user = %user, "Album created");
        }
        Ok(created)
    }

    /// The user's visible cards in ascending id order. Escrowed cards are
    /// not listed.
    ///
    /// # Errors
    /// `AlbumNotFound` or a storage error.
    pub fn album(&self, user: UserId) -> Result<Vec<ItemId>> {
        self.ctx.read(|tx| {
            tx.album(user)
                .map(|album| album.sorted_ids())
                .ok_or(CardexError::AlbumNotFound(user))
        })
    }

    /// The user document.
    ///
    /// # Errors
    /// `UserNotFound` or a storage error.
    pub fn user(&self, user: UserId) -> Result<User> {
        self.ctx
            .read(|tx| tx.user(user).ok_or(CardexError::UserNotFound(user)))
    }

    /// Sell cards back for `sell_price` coins each. Returns the new balance.
    ///
    /// # Errors
    /// `InvalidRequest` for an empty or repeated list, `UserNotFound`,
    /// `NotOwned`, `BalanceLimitExceeded`, or a storage error.
    pub fn sell(&self, owner: UserId, items: &[ItemId]) -> Result<u32> {
        let unique: BTreeSet<ItemId> = items.iter().copied().collect();
        if unique.is_empty() || unique.len() != items.len() {
            return Err(CardexError::InvalidRequest {
                reason: "sell a non-empty list of distinct cards".into(),
            });
        }
        let price = u64::from(self.ctx.config.sell_price);
        let limit = self.ctx.config.max_balance;

        let balance = self.ctx.transact(|tx| {
            let mut user = tx.user(owner).ok_or(CardexError::UserNotFound(owner))?;
            let mut album = tx.album(owner).unwrap_or_else(|| Album::new(owner));
            if let Some(missing) = album.first_missing(&unique) {
                return Err(CardexError::NotOwned(missing));
            }
            user.balance = credited(user.balance, price * unique.len() as u64, limit)?;

            album.remove_all(&unique);
            conservation::retire(tx, "sell_items", &unique)?;
            let balance = user.balance;
            tx.put_user(user);
            tx.put_album(album);
            Ok(balance)
        })?;

        tracing::info!(user = %owner, cards = unique.len(), balance, "Cards sold");
        Ok(balance)
    }

    /// Credit coins from a redeemed coin offer. Returns the new balance.
    ///
    /// # Errors
    /// `InvalidRequest` for a zero amount, `UserNotFound`,
    /// `BalanceLimitExceeded`, or a storage error.
    pub fn redeem_coins(&self, user: UserId, amount: u32) -> Result<u32> {
        if amount == 0 {
            return Err(CardexError::InvalidRequest {
                reason: "coin amount must be positive".into(),
            });
        }
        let limit = self.ctx.config.max_balance;
        let balance = self.ctx.transact(|tx| {
            let mut doc = tx.user(user).ok_or(CardexError::UserNotFound(user))?;
            doc.balance = credited(doc.balance, u64::from(amount), limit)?;
            let balance = doc.balance;
            tx.put_user(doc);
            Ok(balance)
        })?;

        tracing::info!(user = %user, amount, balance, "Coins redeemed");
        Ok(balance)
    }

    /// Set the card shown as the user's favourite.
    ///
    /// # Errors
    /// `CatalogNotReady`, `UnknownItem`, `UserNotFound`, or a storage error.
    pub fn set_favorite_item(&self, user: UserId, item: ItemId) -> Result<()> {
        if !self.ctx.catalog.current()?.contains(item) {
            return Err(CardexError::UnknownItem(item));
        }
        self.ctx.transact(|tx| {
            let mut doc = tx.user(user).ok_or(CardexError::UserNotFound(user))?;
            doc.favorite_item = Some(item);
            tx.put_user(doc);
            Ok(())
        })?;
        tracing::debug!(user = %user, %item, "Favourite card set");
        Ok(())
    }

    /// Remove the user, their album and every trade they take part in.
    ///
    /// Owned and escrowed cards leave the system with the account.
    ///
    /// # Errors
    /// `UserNotFound` or a storage error.
    pub fn delete_account(&self, user: UserId) -> Result<AccountRemoval> {
        let removal = self.ctx.transact(|tx| {
            if tx.user(user).is_none() {
                return Err(CardexError::UserNotFound(user));
            }
            let mut retired: Vec<ItemId> = tx
                .album(user)
                .map(|album| album.sorted_ids())
                .unwrap_or_default();

            let trades = tx.trades_involving(user);
            for trade in &trades {
                if trade.is_pending() && trade.offerer == user {
                    retired.extend(trade.offers.iter().copied());
                }
                tx.remove_trade(trade.id);
            }
            conservation::retire(tx, "delete_account", &retired)?;

            tx.remove_album(user);
            tx.remove_user(user);
            Ok(AccountRemoval {
                trades_removed: trades.len(),
                cards_retired: retired.len(),
            })
        })?;

        tracing::info!(
            user = %user,
            trades = removal.trades_removed,
            cards = removal.cards_retired,
            "Account deleted"
        );
        Ok(removal)
    }
}

/// `balance + amount`, refused beyond `limit`.
fn credited(balance: u32, amount: u64, limit: u32) -> Result<u32> {
    let requested = u64::from(balance) + amount;
    if requested > u64::from(limit) {
        return Err(CardexError::BalanceLimitExceeded { requested, limit });
    }
    u32::try_from(requested).map_err(|_| CardexError::BalanceLimitExceeded { requested, limit })
}
