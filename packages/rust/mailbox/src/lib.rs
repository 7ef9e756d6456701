//! Mailbox-side collaborators of the pipeline.
//!
//! - [`RecipientSource`]: yields raw recipient addresses for a sender
//!   ([`StaticSource`], [`MboxSource`])
//! - [`DomainVerifier`]: checks that recipient domains exist
//!   ([`DnsVerifier`], [`StaticVerifier`])
//! - [`parse_address_list`]: `To`/`Cc`/`Bcc` header parsing

mod address;
mod source;
mod verify;

pub use address::{is_valid_address, parse_address_list};
pub use source::{MboxSource, RecipientSource, StaticSource};
pub use verify::{DnsVerifier, DomainVerifier, StaticVerifier, domain_of};
