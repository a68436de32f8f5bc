/// Creates a `SessionError` with `General` kind
#[macro_export]
macro_rules! general_err {
    ( $context:expr $(,)? ) => {{
        <$crate::SessionError as $crate::SessionErrorExt>::general($context)
    }};
}

/// Creates a `SessionError` with `Reason` kind
#[macro_export]
macro_rules! reason_err {
    ( $context:expr, $($arg:tt)* ) => {{
        <$crate::SessionError as $crate::SessionErrorExt>::reason($context, format!($($arg)*))
    }};
}

/// Creates a `SessionError` with `Protocol` kind
#[macro_export]
macro_rules! protocol_err {
    ( $context:expr, $description:expr $(,)? ) => {{
        <$crate::SessionError as $crate::SessionErrorExt>::protocol($context, $description)
    }};
}

/// Creates a `SessionError` with `Crypto` kind
#[macro_export]
macro_rules! crypto_err {
    ( $context:expr, $description:expr $(,)? ) => {{
        <$crate::SessionError as $crate::SessionErrorExt>::crypto($context, $description)
    }};
}

/// Creates a `SessionError` with `Custom` kind and a source error attached to it
#[macro_export]
macro_rules! custom_err {
    ( $context:expr, $source:expr $(,)? ) => {{
        <$crate::SessionError as $crate::SessionErrorExt>::custom($context, $source)
    }};
}
