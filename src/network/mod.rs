pub mod addr_book;
pub mod address;
pub mod message;
pub mod pex_reactor;
pub mod rate_limiter;
pub mod switch;
pub mod wire;
