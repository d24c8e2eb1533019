// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Generates a cloneable, thread-safe wrapper around a user-provided callback.
///
/// The generated type stores the callback in an `Arc<dyn Fn ...>` and implements `Clone`
/// and `Debug`, which plain closures cannot provide.
///
/// ```rust,ignore
/// define_fn_wrapper!(OnRetry(Fn(args: OnRetryArgs<'_>)));
/// define_fn_wrapper!(RetryIf(Fn(error: &(dyn Error + 'static)) -> bool));
/// ```
macro_rules! define_fn_wrapper {
    ($name:ident(Fn($($param_name:ident: $param_ty:ty),*) -> $return_ty:ty)) => {
        pub(crate) struct $name(std::sync::Arc<dyn Fn($($param_ty),*) -> $return_ty + Send + Sync>);

        impl $name {
            pub(crate) fn new<F>(callback: F) -> Self
            where
                F: Fn($($param_ty),*) -> $return_ty + Send + Sync + 'static,
            {
                Self(std::sync::Arc::new(callback))
            }

            pub(crate) fn call(&self, $($param_name: $param_ty),*) -> $return_ty {
                (self.0)($($param_name),*)
            }
        }

        impl Clone for $name {
            fn clone(&self) -> Self {
                Self(std::sync::Arc::clone(&self.0))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name)).finish()
            }
        }
    };

    ($name:ident(Fn($($param_name:ident: $param_ty:ty),*))) => {
        $crate::define_fn_wrapper!($name(Fn($($param_name: $param_ty),*) -> ()));
    };
}

pub(crate) use define_fn_wrapper;

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    define_fn_wrapper!(Double(Fn(value: u32) -> u32));
    define_fn_wrapper!(Observe(Fn(value: &str)));

    #[test]
    fn static_assertions() {
        static_assertions::assert_impl_all!(Double: Send, Sync, Debug, Clone);
    }

    #[test]
    fn call_ok() {
        let double = Double::new(|value| value * 2);
        assert_eq!(double.call(21), 42);

        let cloned = double.clone();
        assert_eq!(cloned.call(4), 8);
    }

    #[test]
    fn unit_return_ok() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
        let seen_clone = std::sync::Arc::clone(&seen);
        let observe = Observe::new(move |value| seen_clone.lock().unwrap().push_str(value));

        observe.call("probe");

        assert_eq!(seen.lock().unwrap().as_str(), "probe");
    }

    #[test]
    fn debug_ok() {
        let double = Double::new(|value| value);
        assert_eq!(format!("{double:?}"), "Double");
    }
}
