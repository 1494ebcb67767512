//! Support tickets: the only persisted entity.

mod store;
mod ticket;

pub use store::{FileTicketStore, MemoryTicketStore, StoreError, TicketStore};
pub use ticket::{
    title_from_message, Category, NewTicket, ParseVocabularyError, Priority, StatusFilter, Ticket,
    TicketStatus,
};
