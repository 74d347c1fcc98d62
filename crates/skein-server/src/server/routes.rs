//! Service name to handler table shared with connection threads.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;

use crate::handler::{Handler, Method};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum RouteError {
    #[error("unknown service {service}")]
    UnknownService { service: String },
    #[error("unknown method {service}.{method}")]
    UnknownMethod { service: String, method: String },
}

#[derive(Debug, Default)]
pub(crate) struct Routes {
    handlers: RwLock<BTreeMap<String, Handler>>,
}

impl Routes {
    /// Returns the previous handler for the same service, if any.
    pub(crate) fn insert(&self, handler: Handler) -> Option<Handler> {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handler.name().to_owned(), handler)
    }

    /// Resolves a method without holding the table lock afterwards.
    pub(crate) fn lookup(&self, service: &str, method: &str) -> Result<Method, RouteError> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let handler = handlers
            .get(service)
            .ok_or_else(|| RouteError::UnknownService {
                service: service.to_owned(),
            })?;
        handler
            .method(method)
            .cloned()
            .ok_or_else(|| RouteError::UnknownMethod {
                service: service.to_owned(),
                method: method.to_owned(),
            })
    }

    pub(crate) fn services(&self) -> Vec<String> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub(crate) fn endpoints(&self) -> Vec<String> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flat_map(Handler::endpoints)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::stream::Streamer;

    use super::*;

    fn handler(name: &str, method: &str) -> Handler {
        Handler::builder(name)
            .streaming(method, |_: &dyn Streamer| Ok(()))
            .build()
    }

    #[test]
    fn lookup_distinguishes_service_and_method() {
        let routes = Routes::default();
        routes.insert(handler("Greeter", "Hello"));

        assert!(routes.lookup("Greeter", "Hello").is_ok());
        assert_eq!(
            routes.lookup("Greeter", "Bye").err(),
            Some(RouteError::UnknownMethod {
                service: String::from("Greeter"),
                method: String::from("Bye"),
            })
        );
        assert_eq!(
            routes.lookup("Clock", "Hello").err(),
            Some(RouteError::UnknownService {
                service: String::from("Clock"),
            })
        );
    }

    #[test]
    fn insert_overwrites_by_service_name() {
        let routes = Routes::default();
        assert!(routes.insert(handler("Greeter", "Hello")).is_none());
        assert!(routes.insert(handler("Greeter", "Bye")).is_some());

        assert_eq!(routes.services(), vec!["Greeter"]);
        assert_eq!(routes.endpoints(), vec!["Greeter.Bye"]);
    }
}
