//! Routes and the back stack

use std::fmt;

use crate::error::{AutoTunnelError, AutoTunnelResult};

/// Top-level screens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Main,
    Settings,
    Support,
    Config,
}

impl Screen {
    pub fn route(self) -> &'static str {
        match self {
            Screen::Main => "main",
            Screen::Settings => "settings",
            Screen::Support => "support",
            Screen::Config => "config",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Screen::Main => "Tunnels",
            Screen::Settings => "Settings",
            Screen::Support => "Support",
            Screen::Config => "Config",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.route())
    }
}

/// Screens reachable from the bottom bar, in display order
pub const BOTTOM_BAR: [Screen; 3] = [Screen::Main, Screen::Settings, Screen::Support];

/// Where the shell opens
pub const START_DESTINATION: Screen = Screen::Main;

/// A resolved route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Main,
    Settings,
    Support,
    /// Config screen for the tunnel with this id
    Config { id: String },
}

impl Destination {
    pub fn screen(&self) -> Screen {
        match self {
            Destination::Main => Screen::Main,
            Destination::Settings => Screen::Settings,
            Destination::Support => Screen::Support,
            Destination::Config { .. } => Screen::Config,
        }
    }
}

/// Resolve a route string.
///
/// `config/{id}` with a blank id resolves to `Ok(None)`: the route exists but
/// renders nothing. Unknown routes are an error.
pub fn resolve(route: &str) -> AutoTunnelResult<Option<Destination>> {
    let route = route.trim().trim_matches('/');
    let (head, rest) = match route.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => (route, None),
    };

    match (head, rest) {
        ("" | "main", None) => Ok(Some(Destination::Main)),
        ("settings", None) => Ok(Some(Destination::Settings)),
        ("support", None) => Ok(Some(Destination::Support)),
        ("config", id) => {
            let id = id.unwrap_or("").trim();
            if id.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Destination::Config { id: id.to_string() }))
            }
        }
        _ => Err(AutoTunnelError::InvalidParameter(format!("Unknown route: {}", route))),
    }
}

/// Back stack of routes, starting at [`START_DESTINATION`]
#[derive(Debug, Clone)]
pub struct Navigator {
    stack: Vec<String>,
}

impl Default for Navigator {
    fn default() -> Self {
        Self {
            stack: vec![START_DESTINATION.route().to_string()],
        }
    }
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &str {
        self.stack.last().map(String::as_str).unwrap_or(START_DESTINATION.route())
    }

    /// Navigate to `route`. Bottom bar screens replace the stack above the
    /// start destination; navigating to the current route is a no-op.
    pub fn navigate(&mut self, route: &str) -> AutoTunnelResult<Option<Destination>> {
        let destination = resolve(route)?;
        let route = route.trim().trim_matches('/').to_string();
        if route == self.current() {
            return Ok(destination);
        }

        let is_top_level = destination
            .as_ref()
            .is_some_and(|d| BOTTOM_BAR.contains(&d.screen()));
        if is_top_level {
            self.stack.truncate(1);
            if route != START_DESTINATION.route() && !route.is_empty() {
                self.stack.push(route);
            }
        } else {
            self.stack.push(route);
        }
        Ok(destination)
    }

    /// Pop one entry; the start destination is never popped
    pub fn pop_back(&mut self) -> bool {
        if self.stack.len() > 1 {
            self.stack.pop();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_routes() {
        assert_eq!(resolve("main").unwrap(), Some(Destination::Main));
        assert_eq!(resolve("").unwrap(), Some(Destination::Main));
        assert_eq!(resolve("settings").unwrap(), Some(Destination::Settings));
        assert_eq!(resolve("/support/").unwrap(), Some(Destination::Support));
        assert_eq!(
            resolve("config/abc-123").unwrap(),
            Some(Destination::Config {
                id: "abc-123".to_string()
            })
        );
    }

    #[test]
    fn test_blank_config_id_renders_nothing() {
        assert_eq!(resolve("config/").unwrap(), None);
        assert_eq!(resolve("config/   ").unwrap(), None);
        assert_eq!(resolve("config").unwrap(), None);
    }

    #[test]
    fn test_unknown_route_is_an_error() {
        assert!(resolve("bogus").is_err());
        assert!(resolve("settings/extra").is_err());
    }

    #[test]
    fn test_navigator_back_stack() {
        let mut nav = Navigator::new();
        assert_eq!(nav.current(), "main");

        nav.navigate("config/abc").unwrap();
        assert_eq!(nav.current(), "config/abc");
        assert!(nav.pop_back());
        assert_eq!(nav.current(), "main");
        assert!(!nav.pop_back());

        nav.navigate("settings").unwrap();
        nav.navigate("support").unwrap();
        assert!(nav.pop_back());
        assert_eq!(nav.current(), "main");
    }
}
