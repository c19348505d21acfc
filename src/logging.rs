//! Thin wrapper around the `log` facade so call sites compile to nothing
//! when the `log` feature is disabled, rather than failing to resolve.

#[cfg(feature = "log")]
macro_rules! clog {
    ($lvl:ident, $($arg:tt)+) => {
        ::log::$lvl!($($arg)+)
    };
}

#[cfg(not(feature = "log"))]
macro_rules! clog {
    ($lvl:ident, $($arg:tt)+) => {{}};
}
