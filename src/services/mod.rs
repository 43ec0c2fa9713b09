//! Backend services.

pub mod api_client;
pub mod dispatch;
pub mod gateway;
pub mod thread_store;
pub mod token_store;
pub mod transport;

pub use api_client::ApiClient;
pub use dispatch::{DispatchOutcome, Notice, QueryDispatcher};
pub use thread_store::SharedThreads;
pub use token_store::TokenStore;
pub use transport::ReqwestTransport;
