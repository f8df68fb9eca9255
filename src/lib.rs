//! # nofs
//!
//! A Rust crate for reading, initializing and erasing NoFS memory cards.
//!
//! ## Overview
//!
//! NoFS is the filesystem-less layout written by small data loggers that
//! cannot host a real filesystem driver: one header block followed by a raw
//! data region, terminated by a sentinel byte. This crate works on the raw
//! block device underneath any filesystem abstraction:
//!
//! - Locate the card among the host's block devices, refusing to guess
//!   when more than one device could be the target
//! - Decode the data region into a lazy byte stream
//! - Initialize a blank card with a fresh NoFS header
//! - Erase a card's data region, optionally including the header
//!
//! See [`layout`] for the exact on-card format.
//!
//! ## Example
//!
//! ```no_run
//! use nofs::{locate, NofsStream, Operation, Options, Selection, SysfsSource};
//!
//! let options = Options::default();
//! let card = locate(&SysfsSource::new(), &Selection::Auto, Operation::Read, &options).unwrap();
//!
//! let mut stream = NofsStream::open(&card.path, &options).unwrap();
//! let mut out = std::fs::File::create("log.bin").unwrap();
//! let bytes = stream.copy_to(&mut out).unwrap();
//! println!("Read {} bytes from {}", bytes, card.path.display());
//! ```
//!
//! ## Safety
//!
//! Raw device access requires root privileges; the CLI tool requests sudo
//! permissions when needed. Initialize and erase cannot be interrupted
//! safely: a card whose write was cut short is in an unknown state.

mod device;
mod eraser;
mod error;
pub mod layout;
mod locator;
mod options;
mod reader;
mod registry;
mod state;
mod writer;

pub use device::{Access, BlockDevice, DeviceHandle};
pub use eraser::{erase, EraseMode};
pub use error::{Error, ErrorKind, Result};
pub use layout::Header;
pub use locator::{locate, Candidate, DeviceSource, Operation, Selection, SysfsSource};
pub use options::Options;
pub use reader::{read_header, NofsStream};
pub use state::State;
pub use writer::initialize;
