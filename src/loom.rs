#[allow(unused_imports)]
pub(crate) use self::inner::*;

#[cfg(loom)]
mod inner {
    #![allow(dead_code)]
    #![allow(unused_imports)]

    pub(crate) use loom::{model, thread};

    pub(crate) mod sync {
        pub(crate) use loom::sync::{atomic, Arc, Condvar, Mutex, MutexGuard};
    }
}

#[cfg(not(loom))]
mod inner {
    #![allow(dead_code)]
    #![allow(unused_imports)]

    pub(crate) use std::thread;

    pub(crate) mod sync {
        pub(crate) use std::sync::{atomic, Arc, Condvar, Mutex, MutexGuard};
    }

    /// Outside of loom, a "model" is just running the test once.
    #[cfg(test)]
    pub(crate) fn model(f: impl Fn() + Sync + Send + 'static) {
        f()
    }
}
