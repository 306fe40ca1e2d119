pub mod attachments;
pub mod commands;
pub mod dispatcher;
pub mod replies;
pub mod router;

pub use dispatcher::Dispatcher;
pub use router::CommandRouter;
