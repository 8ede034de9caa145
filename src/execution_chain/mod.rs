mod balances;
mod block_locator;
mod node;
mod provider_pool;
mod retry;

pub use balances::balance_at;
pub use balances::FetchError;

pub use block_locator::locate_block;
pub use block_locator::LocateError;

pub use node::BlockNumber;
pub use node::ExecutionNodeHttp;
pub use node::ExecutionProvider;
pub use node::MockExecutionProvider;
pub use node::ProviderError;

#[cfg(test)]
pub use node::test_utils::FakeExecutionNode;

pub use provider_pool::ConnectivityError;
pub use provider_pool::DynExecutionProvider;
pub use provider_pool::NamedProvider;
pub use provider_pool::Provider;
pub use provider_pool::ProviderPool;

pub use retry::with_rate_limit_retry;
pub use retry::RetryError;
pub use retry::RetryPolicy;
