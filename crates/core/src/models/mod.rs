pub mod assignment;
pub mod event;
pub mod join;
pub mod notification;
pub mod role;
pub mod room;
pub mod session;

pub use assignment::{Assignment, BatchMember, PaymentStatus};
pub use event::{Actor, LifecycleTarget, NewRoomEvent, RoomEvent};
pub use join::{
    CallerCredential, Device, JoinGrants, JoinRequest, JoinTicket, LiveParticipant, MintedCredential,
    PortalIdentity, TrackSource,
};
pub use notification::{
    DeliveryOutcome, DispatchReceipt, LedgerClaim, Notification, Priority, ReminderCounts, ReminderWindow,
    REMINDER_TEMPLATE, TIMETABLE_TEMPLATE,
};
pub use role::Role;
pub use room::{NewRoom, Room};
pub use session::{NewSession, Session, SessionFilter, SessionStatus};
