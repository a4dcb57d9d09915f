//! HTTP-flavoured effect registration.
//!
//! An [`Api`] is a [`Pipe`] whose effects are named after a path and an HTTP
//! verb, for example `"/users [POST]"`. The URL parser middleware later
//! turns that name back into a URL and a method.

use crate::pipe::{EffectCreator, Pipe};
use fxpipe_core::{Context, FxStatus, Next, Request, SharedMiddleware, Stack, from_fn};
use std::fmt;

/// Pipe with URI and verb registration helpers
pub struct Api<S> {
    pipe: Pipe<S>,
}

impl<S: 'static> Api<S> {
    /// Create an API with an empty pipe
    #[must_use]
    pub fn new() -> Self {
        Self { pipe: Pipe::new() }
    }

    /// The underlying pipe
    #[must_use]
    pub const fn pipe(&self) -> &Pipe<S> {
        &self.pipe
    }

    /// Append middleware to the global chain
    pub fn use_middleware(&self, middleware: SharedMiddleware<S>) {
        self.pipe.use_middleware(middleware);
    }

    /// Middleware running the current effect's own stack
    #[must_use]
    pub fn actions(&self) -> SharedMiddleware<S> {
        self.pipe.actions()
    }

    /// Register an effect under an arbitrary name
    pub fn create(&self, name: impl Into<String>, stack: impl Into<Stack<S>>) -> EffectCreator<S> {
        self.pipe.create(name, stack)
    }

    /// Last recorded status of the effect `name`
    #[must_use]
    pub fn status(&self, name: &str) -> FxStatus {
        self.pipe.status(name)
    }

    /// Verb registration for `path`
    #[must_use]
    pub fn uri(&self, path: impl Into<String>) -> Uri<S> {
        Uri {
            pipe: self.pipe.clone(),
            path: path.into(),
        }
    }

    /// Middleware replacing `ctx.request` with `request`
    #[must_use]
    pub fn request(&self, request: Request) -> SharedMiddleware<S> {
        from_fn(move |ctx: &mut Context<S>, mut next: Next<S>| {
            ctx.request = Some(request.clone());
            next.run(ctx)
        })
    }
}

impl<S: 'static> Default for Api<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for Api<S> {
    fn clone(&self) -> Self {
        Self {
            pipe: self.pipe.clone(),
        }
    }
}

impl<S> fmt::Debug for Api<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api").field("pipe", &self.pipe).finish()
    }
}

/// Registers effects for one path, one method per HTTP verb
pub struct Uri<S> {
    pipe: Pipe<S>,
    path: String,
}

impl<S: 'static> Uri<S> {
    /// The registered path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    fn register(&self, verb: &str, stack: impl Into<Stack<S>>) -> EffectCreator<S> {
        self.pipe.create(format!("{} [{verb}]", self.path), stack)
    }
}

impl<S> fmt::Debug for Uri<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Uri").field(&self.path).finish()
    }
}

macro_rules! http_verbs {
    ($($verb:ident => $label:literal),* $(,)?) => {
        impl<S: 'static> Uri<S> {
            $(
                #[doc = concat!("Register `{path} [", $label, "]`")]
                pub fn $verb(&self, stack: impl Into<Stack<S>>) -> EffectCreator<S> {
                    self.register($label, stack)
                }
            )*
        }

        impl<S: 'static> Api<S> {
            $(
                #[doc = concat!("Register `{path} [", $label, "]`, shorthand for `uri(path).", stringify!($verb), "(stack)`")]
                pub fn $verb(&self, path: impl Into<String>, stack: impl Into<Stack<S>>) -> EffectCreator<S> {
                    self.uri(path).$verb(stack)
                }
            )*
        }
    };
}

http_verbs! {
    get => "GET",
    post => "POST",
    put => "PUT",
    patch => "PATCH",
    delete => "DELETE",
    options => "OPTIONS",
    head => "HEAD",
    connect => "CONNECT",
    trace => "TRACE",
}

/// Split a trailing `[VERB]` marker off an effect name
///
/// Matching is case-insensitive and swallows the whitespace around the
/// marker. Names without a known verb are returned unchanged.
#[must_use]
pub fn strip_verb(name: &str) -> (String, Option<http::Method>) {
    let mut from = 0;
    while let Some(open) = name[from..].find('[').map(|offset| offset + from) {
        let Some(close) = name[open..].find(']').map(|offset| offset + open) else {
            break;
        };
        let verb = &name[open + 1..close];
        if let Some(method) = HTTP_METHODS.iter().find(|method| method.as_str().eq_ignore_ascii_case(verb)) {
            let before = name[..open].trim_end();
            let after = name[close + 1..].trim_start();
            return (format!("{before}{after}"), Some(method.clone()));
        }
        from = open + 1;
    }
    (name.to_owned(), None)
}

const HTTP_METHODS: [http::Method; 9] = [
    http::Method::GET,
    http::Method::HEAD,
    http::Method::POST,
    http::Method::PUT,
    http::Method::DELETE,
    http::Method::CONNECT,
    http::Method::OPTIONS,
    http::Method::TRACE,
    http::Method::PATCH,
];
