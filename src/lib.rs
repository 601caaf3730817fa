//! # bitterm — serial terminal core
//!
//! Single-connection serial terminal engine providing:
//!
//! - **Transport** – abstracted non-blocking read / blocking write over a
//!   serial port at a configurable port name and baud rate
//! - **Codec** – binary (space-separated 8-bit groups) and ASCII rendering
//!   of received bytes, and parsing of hand-typed base-2 byte tokens
//! - **Reader Loop** – cancellable background task polling the port and
//!   emitting timestamped display events
//! - **Session Controller** – connect / disconnect / send state machine
//!   driven by the presentation shell
//! - **Port Discovery** – enumerate COM / tty ports for the shell's picker

pub mod terminal;
