pub mod channels;
pub mod queries;
pub mod receipts;
pub(crate) mod send;
pub mod subscriptions;
pub mod transport;

pub use channels::ChannelRegistry;
pub use queries::{QueryLayer, QueryResult};
pub use receipts::ReceiptTracker;
pub use subscriptions::{SubscriptionManager, TopicScope};
pub use transport::{ChannelState, Subscription, Transport};
