pub mod auth;
pub mod conversations;
pub mod error;
pub mod listings;
pub mod middleware;
pub mod pagination;
pub mod repairs;
pub mod routes;
pub mod state;
pub mod stores;
pub mod uploads;
pub mod users;

pub(crate) mod convert;
