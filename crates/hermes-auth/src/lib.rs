//! # Hermes Auth
//!
//! Authentication providers for the Hermes pipeline.
//!
//! A route lists the providers it accepts. They run in that order and the
//! first one to verify the request wins. A provider that finds no
//! credential of its kind steps aside ([`AuthOutcome::Absent`]); one that
//! finds a bad credential records why ([`AuthOutcome::Rejected`]) and the
//! next provider is tried.
//!
//! | Provider | Credential |
//! |----------|------------|
//! | [`BearerTokenProvider`] | `Authorization: Bearer <HS256 token>` |
//! | [`BasicAuthProvider`] | `Authorization: Basic base64(user:password)` |
//! | [`TicketProvider`] | `x-ticket` header or `?ticket=`, redeemed once |

#![doc(html_root_url = "https://docs.rs/hermes-auth/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod basic;
mod bearer;
mod error;
mod provider;
mod store;
mod ticket;

pub use basic::{Account, BasicAuthProvider, CredentialStore, MemoryCredentialStore};
pub use bearer::{BearerConfig, BearerTokenProvider, Claims, TokenPair, MIN_SECRET_LEN};
pub use error::{AuthFailure, AuthSetupError};
pub use provider::{authenticate_with, AuthOutcome, AuthProvider, ProviderRegistry, SharedAuthProvider};
pub use store::{MemoryTicketStore, Redemption, Ticket, TicketStore, DEFAULT_TICKET_TTL};
pub use ticket::{TicketProvider, TICKET_HEADER, TICKET_QUERY};
