pub mod expiry;
pub mod manager;
pub mod models;
pub mod reference;
pub mod refund;
pub mod repository;

pub use expiry::ExpirySweeper;
pub use manager::{
    BookingError, BookingManager, BookingPolicy, BookingResult, CreateBookingRequest, ExpiryBatch, PassengerRequest,
};
pub use models::{
    BaggageAllowance, Booking, BookingStatus, ContactInfo, DocumentType, FareTerms, FareType, Passenger, Ticket,
    TicketError, TicketStatus, TravelDocument,
};
pub use reference::{AtomicTicketSequence, RandomReferenceGenerator, ReferenceGenerator, TicketNumberSequence};
pub use refund::RefundCalculator;
pub use repository::{BookingRepository, InMemoryBookingRepository, InMemoryPassengerRepository, PassengerRepository};
