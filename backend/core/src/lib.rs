//! Wright core: the command/result protocol shared by the relay client and server.

pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod mock;
pub mod parsed_action;
pub mod traits;
pub mod types;

pub use codec::{decode_command, decode_result, encode_command, encode_result};
pub use dispatcher::{Dispatcher, Invocation};
pub use error::{BackendError, ConnectionError, FatalInitError, ProtocolError, ValidationError};
pub use mock::{BackendCall, MockBackend};
pub use parsed_action::ParsedAction;
pub use traits::AutomationBackend;
pub use types::{ActionResult, ActionType, Command, DEFAULT_TIMEOUT_MS};
