//! The PostForge interpreter: tokenizer, execution engine, operator
//! registry, error protocol, and job server.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                     Context                         │
//! ├────────────────────────────────────────────────────┤
//! │  operand stack   │ execution stack │ dict stack     │
//! │  Vec<Object>     │ Vec<ExecItem>   │ Vec<Object>    │
//! │                                                     │
//! │  ┌────────────┐  ┌──────────────┐  ┌────────────┐   │
//! │  │ Memory     │  │ FileRegistry │  │ Operators  │   │
//! │  │ local/glob │  │ %stdin …     │  │ ~240 fns   │   │
//! │  └────────────┘  └──────────────┘  └────────────┘   │
//! │                                                     │
//! │  GraphicsState + gstate stack + DisplayList         │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! Bytes flow tokenizer → engine → operators → graphics state → display
//! list. The engine is a flat state machine over the execution stack: five
//! dispatch paths plus Stopped / Loop / HardReturn marker frames, with no
//! host-level exceptions for PostScript errors.
//!
//! # Example
//!
//! ```ignore
//! use postforge_vm::Context;
//!
//! let mut ctx = Context::new();
//! ctx.run_bytes(b"3 4 add ==").unwrap();
//! ```

pub mod color_driver;
pub mod context;
pub mod device;
pub mod dict_stack;
pub mod engine;
pub mod errors;
pub mod files;
pub mod init;
pub mod job;
pub mod ops;
pub mod scanner;

pub use context::{Context, SystemParams, UserParams};
pub use device::{CaptureDevice, Device, PageCapture};
pub use engine::{ExecItem, LoopFrame};
pub use ops::OperatorTable;
