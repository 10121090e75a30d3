//! Named constructor registries with middleware
//!
//! Middleware transforms the construction data in registration order before
//! the named constructor runs. Creating an unregistered name logs a warning
//! and yields `None`.

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// One or more registration names
pub trait Names {
    /// The names as owned strings
    fn into_names(self) -> Vec<String>;
}

impl Names for &str {
    fn into_names(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl Names for String {
    fn into_names(self) -> Vec<String> {
        vec![self]
    }
}

impl Names for &[&str] {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|name| name.to_string()).collect()
    }
}

impl<const N: usize> Names for [&str; N] {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|name| name.to_string()).collect()
    }
}

impl Names for Vec<&str> {
    fn into_names(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl Names for Vec<String> {
    fn into_names(self) -> Vec<String> {
        self
    }
}

type Constructor<D, T> = Rc<dyn Fn(D) -> T>;
type Middleware<D> = Box<dyn Fn(D) -> D>;
type AsyncMiddleware<D> = Box<dyn Fn(D) -> LocalBoxFuture<'static, D>>;

fn register<D, T>(constructors: &mut HashMap<String, Constructor<D, T>>, names: impl Names, constructor: Constructor<D, T>) {
    for name in names.into_names() {
        if constructors.insert(name.clone(), Rc::clone(&constructor)).is_some() {
            log::debug!("Factory constructor '{}' replaced", name);
        }
    }
}

fn lookup<'a, D, T>(constructors: &'a HashMap<String, Constructor<D, T>>, name: &str) -> Option<&'a Constructor<D, T>> {
    let constructor = constructors.get(name);
    if constructor.is_none() {
        log::warn!("No factory constructor registered for '{}'", name);
    }
    constructor
}

/// Synchronous constructor registry
pub struct Factory<D, T> {
    middleware: Vec<Middleware<D>>,
    constructors: HashMap<String, Constructor<D, T>>,
}

impl<D, T> Factory<D, T> {
    /// Create an empty factory
    pub fn new() -> Self {
        Self {
            middleware: Vec::new(),
            constructors: HashMap::new(),
        }
    }

    /// Append a transform applied to construction data
    pub fn use_middleware<F>(&mut self, middleware: F) -> &mut Self
    where
        F: Fn(D) -> D + 'static,
    {
        self.middleware.push(Box::new(middleware));
        self
    }

    /// Register `constructor` under one or more names
    ///
    /// # Arguments
    /// * `names` - A name, or a list of names sharing the constructor
    /// * `constructor` - Builds the product from transformed data
    pub fn set<F>(&mut self, names: impl Names, constructor: F) -> &mut Self
    where
        F: Fn(D) -> T + 'static,
    {
        register(&mut self.constructors, names, Rc::new(constructor));
        self
    }

    /// Whether a constructor is registered under `name`
    pub fn has(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, in no particular order
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Run `data` through the middleware, then the constructor registered as `name`
    ///
    /// # Returns
    /// The product, or `None` (with a warning) if `name` is not registered
    pub fn create(&self, name: &str, data: D) -> Option<T> {
        let constructor = lookup(&self.constructors, name)?;
        let data = self
            .middleware
            .iter()
            .fold(data, |data, middleware| middleware(data));
        Some(constructor(data))
    }
}

impl<D, T> Default for Factory<D, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, T> fmt::Debug for Factory<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("middleware", &self.middleware.len())
            .field("constructors", &self.names())
            .finish()
    }
}

/// Constructor registry with asynchronous middleware
pub struct AsyncFactory<D, T> {
    middleware: Vec<AsyncMiddleware<D>>,
    constructors: HashMap<String, Constructor<D, T>>,
}

impl<D: 'static, T> AsyncFactory<D, T> {
    /// Create an empty factory
    pub fn new() -> Self {
        Self {
            middleware: Vec::new(),
            constructors: HashMap::new(),
        }
    }

    /// Append an asynchronous transform applied to construction data
    pub fn use_middleware<F, Fut>(&mut self, middleware: F) -> &mut Self
    where
        F: Fn(D) -> Fut + 'static,
        Fut: Future<Output = D> + 'static,
    {
        self.middleware
            .push(Box::new(move |data| middleware(data).boxed_local()));
        self
    }

    /// Register `constructor` under one or more names
    pub fn set<F>(&mut self, names: impl Names, constructor: F) -> &mut Self
    where
        F: Fn(D) -> T + 'static,
    {
        register(&mut self.constructors, names, Rc::new(constructor));
        self
    }

    /// Whether a constructor is registered under `name`
    pub fn has(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, in no particular order
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Await each middleware in turn on `data`, then run the constructor registered as `name`
    pub async fn create(&self, name: &str, data: D) -> Option<T> {
        let constructor = Rc::clone(lookup(&self.constructors, name)?);
        let mut data = data;
        for middleware in &self.middleware {
            data = middleware(data).await;
        }
        Some(constructor(data))
    }
}

impl<D: 'static, T> Default for AsyncFactory<D, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, T> fmt::Debug for AsyncFactory<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFactory")
            .field("middleware", &self.middleware.len())
            .field("constructors", &self.constructors.len())
            .finish()
    }
}
