pub mod test_handler;
pub mod ticket_handler;

pub use test_handler::TestEventHandler;
pub use ticket_handler::TicketHandler;
