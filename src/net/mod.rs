//! Neighbor directions, the message transport and the multi-phase exchange
//! task built on top of them.

pub mod direction;
pub mod exchange;
pub mod transport;

pub use direction::{ExchangeDirection, Neighborhood, MAX_DIM};
pub use exchange::{BufferExchange, ExchangeHandler, ExchangeSendTask, ExchangeState};
pub use transport::{Delivery, Incoming, LoopbackTransport, Payload, Transport};
