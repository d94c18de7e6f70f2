use crate::error::{ParleyError, Result};
use std::fmt;

/// Screens of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Sign in / sign up
    Landing,
    /// Conversation view, only reachable with a session
    Chat,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Landing => "/",
            Route::Chat => "/chat",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Where navigating to `requested` actually lands.
///
/// `/chat` without a session fails with [`ParleyError::AuthRequired`]; the
/// caller shows the landing page instead. A signed-in user asking for the
/// landing page is sent on to `/chat`.
pub fn resolve(requested: Route, authenticated: bool) -> Result<Route> {
    match (requested, authenticated) {
        (Route::Chat, false) => Err(ParleyError::AuthRequired),
        (Route::Landing, true) => Ok(Route::Chat),
        (route, _) => Ok(route),
    }
}
