//! A minimal ledger: accounts owned by users, and an engine that moves funds
//! between them atomically and safely under concurrent use.
//!
//! ```
//! use std::sync::Arc;
//! use rust_decimal_macros::dec;
//! use transfer_ledger::{Amount, EngineConfig, InMemoryAccountStore, OwnerId, TransferEngine};
//!
//! let engine = TransferEngine::new(Arc::new(InMemoryAccountStore::default()), EngineConfig::default());
//! let (alice, bob) = (OwnerId::from("alice"), OwnerId::from("bob"));
//! engine.open_account(alice.clone(), Amount::try_from(dec!(100)).unwrap()).unwrap();
//! engine.open_account(bob.clone(), Amount::ZERO).unwrap();
//!
//! engine.transfer(&alice, &bob, dec!(40)).unwrap();
//! assert_eq!(engine.balance(&alice).unwrap().to_decimal(), dec!(60));
//! assert_eq!(engine.balance(&bob).unwrap().to_decimal(), dec!(40));
//! ```

mod engine;

pub use engine::*;
