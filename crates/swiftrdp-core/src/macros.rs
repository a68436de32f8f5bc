//! Helper macros for PDU encoding and decoding.
//!
//! These are exported and used by the codec crates.

/// Returns a `NotEnoughBytes` error when the cursor holds fewer than the
/// expected number of bytes.
///
/// Works for both decoding (`ReadCursor`) and encoding (`WriteCursor`);
/// the error type is inferred from the enclosing function.
#[macro_export]
macro_rules! ensure_size {
    (ctx: $ctx:expr, in: $buf:ident, size: $expected:expr) => {{
        let received = $buf.len();
        let expected = $expected;
        if !(received >= expected) {
            return Err($crate::not_enough_bytes_err($ctx, received, expected));
        }
    }};
    (in: $buf:ident, size: $expected:expr) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: $expected)
    }};
}

/// Shorthand for `ensure_size!` against `Self::FIXED_PART_SIZE`.
#[macro_export]
macro_rules! ensure_fixed_part_size {
    (in: $buf:ident) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: Self::FIXED_PART_SIZE)
    }};
}

/// Fallible integer narrowing reported as an `InvalidField` error.
#[macro_export]
macro_rules! cast_length {
    (ctx: $ctx:expr, $field:expr, $len:expr) => {{
        ::core::convert::TryInto::try_into($len)
            .map_err(|e| $crate::invalid_field_err_with_source($ctx, $field, "too many elements", e))
    }};
    ($field:expr, $len:expr) => {{
        $crate::cast_length!(ctx: Self::NAME, $field, $len)
    }};
}

/// Creates an `InvalidField` error.
#[macro_export]
macro_rules! invalid_field_err {
    (ctx: $ctx:expr, $field:expr, $reason:expr) => {{
        $crate::invalid_field_err($ctx, $field, $reason)
    }};
    ($field:expr, $reason:expr) => {{
        $crate::invalid_field_err!(ctx: Self::NAME, $field, $reason)
    }};
}

/// Creates an `Other` error.
#[macro_export]
macro_rules! other_err {
    (ctx: $ctx:expr, $description:expr) => {{
        $crate::other_err($ctx, $description)
    }};
    (ctx: $ctx:expr, source: $source:expr) => {{
        $crate::other_err_with_source($ctx, "", $source)
    }};
    ($description:expr) => {{
        $crate::other_err!(ctx: Self::NAME, $description)
    }};
}

/// Asserts that the traits support dynamic dispatch.
///
/// From <https://docs.rs/static_assertions/1.1.0/src/static_assertions/assert_obj_safe.rs.html#72-76>
#[macro_export]
macro_rules! assert_obj_safe {
    ($($xs:path),+ $(,)?) => {
        $(const _: Option<&dyn $xs> = None;)+
    };
}
