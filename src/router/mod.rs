//! Navigation: route vocabulary and the router store.

pub mod route;
pub mod router_store;

pub use route::{
    ContextKey, NavigationAction, NavigationRequest, Navigates, RouteStack, RouteToken,
};
pub use router_store::{RouterCommand, RouterEvent, RouterReducer, RouterState, RouterStore};
