//! Integer conversions between wire lengths (u32 / i32) and in-memory lengths (usize).

/// Lossless widening, e.g. a length prefix read from the wire into a buffer length.
pub trait SafeCast<T> {
    fn safe_cast(self) -> T;
}

#[cfg(not(target_pointer_width = "16"))]
impl SafeCast<usize> for u32 {
    fn safe_cast(self) -> usize {
        self as usize
    }
}


/// Narrowing of a length that was validated against a protocol or configured maximum before it
///  is written to the wire. Panics if the value does not fit, which means a missing check.
pub trait PrecheckedCast<T> {
    fn prechecked_cast(self) -> T;
}

macro_rules! prechecked_from_usize {
    ($target:ty) => {
        impl PrecheckedCast<$target> for usize {
            fn prechecked_cast(self) -> $target {
                <$target>::try_from(self)
                    .unwrap_or_else(|_| panic!("length {} was not checked against the wire format's range", self))
            }
        }
    };
}

prechecked_from_usize!(u32);
prechecked_from_usize!(i32);
