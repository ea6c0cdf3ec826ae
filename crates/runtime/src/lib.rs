// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tm-runtime: TTCN-3 execution runtime embedded in each Test Executable.
//!
//! Test components run on dedicated worker threads and exchange messages
//! through ports. Timer expiries, component done/killed events and
//! inter-component control commands all transit through a single ordered
//! system queue, consumed by `alt` alongside port queues.

pub mod adapter;
pub mod alt;
pub mod codec;
pub mod component;
pub mod context;
pub mod error;
pub mod event;
pub mod matching;
pub mod notify;
pub mod port;
pub mod queue;
pub mod runtime;
pub mod template;
pub mod testcase;
pub mod timer;
pub mod value;
pub mod variables;

pub use adapter::{Binding, LoopbackAdapter, NoopAdapter, TestAdapter, TestAdapterConfiguration};
pub use alt::{alt, AltCondition, AltVerdict, Alternative, ReceiveSpec};
pub use codec::{Codec, CodecRegistry};
pub use component::{TcState, TestComponent};
pub use context::{StateManager, TcContext};
pub use error::{TcError, TcResult};
pub use event::{SystemEvent, SystemEventTemplate};
pub use matching::{match_message, MatchOutcome};
pub use notify::Notifier;
pub use port::{connect, disconnect, port_map, port_unmap, Port, TsiPort};
pub use queue::SystemQueue;
pub use runtime::{Runtime, TestCaseResult};
pub use template::{Condition, Template};
pub use testcase::{TestCase, TestCaseRole};
pub use timer::{Timer, TimerService};
pub use value::{octetstring, Value};
pub use variables::VariableStore;
