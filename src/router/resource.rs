use http::Method;

use super::core::Router;
use super::error::ConfigError;
use super::route::{Handler, HandlerResult, Middleware, RouteId};
use crate::context::Context;

/// Conventional resource actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Index,
    Create,
    Store,
    Edit,
    Update,
    Destroy,
    Show,
}

impl Action {
    /// Registration order.
    pub const ALL: [Action; 7] = [
        Action::Index,
        Action::Create,
        Action::Store,
        Action::Edit,
        Action::Update,
        Action::Destroy,
        Action::Show,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Index => "index",
            Action::Create => "create",
            Action::Store => "store",
            Action::Edit => "edit",
            Action::Update => "update",
            Action::Destroy => "destroy",
            Action::Show => "show",
        }
    }

    pub fn method(self) -> Method {
        match self {
            Action::Index | Action::Create | Action::Edit | Action::Show => Method::GET,
            Action::Store => Method::POST,
            Action::Update => Method::PUT,
            Action::Destroy => Method::DELETE,
        }
    }

    /// Path of the action below `base`.
    pub fn path(self, base: &str) -> String {
        let base = base.trim_end_matches('/');
        match self {
            Action::Index | Action::Store => format!("{base}/"),
            Action::Create => format!("{base}/create"),
            Action::Edit => format!("{base}/edit/:id"),
            Action::Update => format!("{base}/update/:id"),
            Action::Destroy => format!("{base}/delete/:id"),
            Action::Show => format!("{base}/show/:id"),
        }
    }
}

/// Set of handlers for a resource; actions without a handler are not registered.
#[derive(Debug, Clone, Default)]
pub struct Resource {
    handlers: Vec<(Action, Handler)>,
}

macro_rules! action_setter {
    ($($fn_name:ident => $action:expr),* $(,)?) => {
        $(
            pub fn $fn_name<F>(self, handler: F) -> Self
            where
                F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
            {
                self.action($action, Handler::new(handler))
            }
        )*
    };
}

impl Resource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the handler of `action`.
    #[must_use]
    pub fn action(mut self, action: Action, handler: Handler) -> Self {
        self.handlers.retain(|(a, _)| *a != action);
        self.handlers.push((action, handler));
        self
    }

    action_setter! {
        index => Action::Index,
        create => Action::Create,
        store => Action::Store,
        edit => Action::Edit,
        update => Action::Update,
        destroy => Action::Destroy,
        show => Action::Show,
    }

    fn take(&mut self, action: Action) -> Option<Handler> {
        let pos = self.handlers.iter().position(|(a, _)| *a == action)?;
        Some(self.handlers.swap_remove(pos).1)
    }
}

impl Router {
    /// Register the actions of `resource` below `path`.
    pub fn resource(
        &mut self,
        path: &str,
        mut resource: Resource,
    ) -> Result<ResourceRef<'_>, ConfigError> {
        let mut routes = Vec::new();
        for action in Action::ALL {
            if let Some(handler) = resource.take(action) {
                let id = self.add(&[action.method()], &action.path(path), handler)?.id();
                routes.push((action, id));
            }
        }
        Ok(ResourceRef {
            router: self,
            routes,
        })
    }
}

/// Handle to the routes of one resource.
pub struct ResourceRef<'r> {
    router: &'r mut Router,
    routes: Vec<(Action, RouteId)>,
}

impl<'r> ResourceRef<'r> {
    pub fn routes(&self) -> &[(Action, RouteId)] {
        &self.routes
    }

    /// Name every action `<prefix>.<action>`.
    pub fn name(self, prefix: &str) -> Result<Self, ConfigError> {
        for &(action, id) in &self.routes {
            self.router
                .rename(id, &format!("{prefix}.{}", action.as_str()))?;
        }
        Ok(self)
    }

    pub fn label(self, label: &str) -> Self {
        for &(_, id) in &self.routes {
            if let Some(route) = self.router.route_mut(id) {
                route.add_label(label);
            }
        }
        self
    }

    pub fn use_middleware(self, middleware: Middleware) -> Self {
        for &(_, id) in &self.routes {
            if let Some(route) = self.router.route_mut(id) {
                route.middleware.push(middleware.clone());
                route.invalidate_chain();
            }
        }
        self
    }

    /// Route-level constraint on every action.
    pub fn regexp(self, param: &str, pattern: &str) -> Result<Self, ConfigError> {
        let constraint = super::route::Constraint::compile(
            param,
            pattern,
            super::route::ConstraintScope::Route,
        )?;
        for &(_, id) in &self.routes {
            if let Some(route) = self.router.route_mut(id) {
                route.constraints.insert(param.to_string(), constraint.clone());
            }
        }
        Ok(self)
    }
}
