use axum::routing::MethodRouter;

use crate::utils::gateway::AppStateData;

pub mod fallback;
pub mod openai_compatible;
pub mod status;

/// Routes built by a module but not yet registered on a router.
pub struct RouteHandlers {
    pub routes: Vec<(&'static str, MethodRouter<AppStateData>)>,
}
