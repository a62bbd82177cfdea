pub mod document;
pub mod engine;
pub mod error;
pub mod event;
pub mod executor;
pub mod http;
pub mod node;
pub mod resolve;
pub mod transport;
pub mod tree;
pub mod value;

pub use engine::{ActionHandler, Delivery, Engine, EngineConfig};
pub use error::{EngineError, FetchError};
pub use event::{Action, EventHandler};
pub use tree::{NodeId, Tree};
pub use value::{Map, Value};
