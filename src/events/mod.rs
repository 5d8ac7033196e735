//! # Events Module
//!
//! Progress reporting for GUI and CLI front ends.
//!
//! ## Design
//! The engine takes an explicit [`EventSender`] and emits events at state
//! changes and batch boundaries. Any UI (CLI, GUI, web) can subscribe.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = event_channel();
//!
//! // In a separate thread, listen for events
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         match event {
//!             Event::Sync(SyncEvent::BatchCommitted(p)) => println!("{} batches", p.batches_committed),
//!             Event::Sync(SyncEvent::Completed(s)) => println!("{} added", s.added),
//!             _ => {}
//!         }
//!     }
//! });
//!
//! synchronizer.run(&mut repository, &sender)?;
//! ```

mod channel;
mod types;

pub use channel::{event_channel, null_sender, EventReceiver, EventSender};
pub use types::*;
