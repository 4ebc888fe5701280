pub mod clock;
pub mod notification;
pub mod payment;

pub use clock::{Clock, ManualClock, SystemClock};
pub use notification::{InMemoryNotificationSink, LoggingNotificationSink, NotificationSink};
pub use payment::{MockPaymentGateway, PaymentError, PaymentGateway, PaymentReceipt, PaymentStatus};

/// Error type crossing every repository / adapter boundary.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

pub type StoreResult<T> = Result<T, StoreError>;
