//! Typed handles over one field of one entity.
//!
//! Handles are cheap views: reads go to the engine's value cache and never
//! touch the network, writes update the cache before they are queued. Every
//! setter has a `_sync` variant that waits until the store confirmed the
//! write and returns its error.

mod cached;
mod collection;
mod persistent;
mod reference;
mod serialized;
pub use cached::*;
pub use collection::*;
pub use persistent::*;
pub use reference::*;
pub use serialized::*;

use crate::write_path::WriteTicket;
use crate::Result;

async fn settle(ticket: Option<WriteTicket>) -> Result<()> {
    match ticket {
        Some(ticket) => ticket.wait().await,
        None => Ok(()),
    }
}
