//! Text codec for leaf setting values.
//!
//! Every format here is locale-independent and round-trippable: writing a
//! value and reading it back yields an equal value. Floats use Rust's shortest
//! round-trip representation, date-times use RFC 3339 with full sub-second
//! precision, and durations use a `[d.]hh:mm:ss[.fffffffff]` time-span form.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use url::Url;
use uuid::Uuid;

/// A value that can be stored as the text of a single XML node.
pub trait ScalarValue: Sized {
    fn to_text(&self) -> String;

    fn from_text(text: &str) -> Result<Self, String>;

    /// Whether this value is absent and should not be written at all.
    fn is_null(&self) -> bool {
        false
    }

    /// Value used when the document has no node and no default is declared.
    /// `None` leaves the current value untouched.
    fn absent() -> Option<Self> {
        None
    }
}

impl ScalarValue for String {
    fn to_text(&self) -> String {
        self.clone()
    }

    fn from_text(text: &str) -> Result<Self, String> {
        Ok(text.to_string())
    }
}

impl ScalarValue for bool {
    fn to_text(&self) -> String {
        self.to_string()
    }

    fn from_text(text: &str) -> Result<Self, String> {
        match text.trim() {
            t if t.eq_ignore_ascii_case("true") => Ok(true),
            t if t.eq_ignore_ascii_case("false") => Ok(false),
            other => Err(format!("'{other}' is not a boolean")),
        }
    }
}

macro_rules! scalar_via_from_str {
    ($($ty:ty => $label:literal),* $(,)?) => {
        $(
            impl ScalarValue for $ty {
                fn to_text(&self) -> String {
                    self.to_string()
                }

                fn from_text(text: &str) -> Result<Self, String> {
                    let trimmed = text.trim();
                    <$ty>::from_str(trimmed)
                        .map_err(|e| format!("'{trimmed}' is not a valid {}: {e}", $label))
                }
            }
        )*
    };
}

scalar_via_from_str! {
    i8 => "i8", i16 => "i16", i32 => "i32", i64 => "i64", i128 => "i128", isize => "isize",
    u8 => "u8", u16 => "u16", u32 => "u32", u64 => "u64", u128 => "u128", usize => "usize",
    Decimal => "decimal",
    Uuid => "guid",
    NaiveDate => "date",
}

macro_rules! scalar_float {
    ($($ty:ty),*) => {
        $(
            impl ScalarValue for $ty {
                fn to_text(&self) -> String {
                    if self.is_nan() {
                        "NaN".into()
                    } else if self.is_infinite() {
                        if *self > 0.0 { "Infinity".into() } else { "-Infinity".into() }
                    } else {
                        self.to_string()
                    }
                }

                fn from_text(text: &str) -> Result<Self, String> {
                    match text.trim() {
                        "NaN" => Ok(<$ty>::NAN),
                        "Infinity" => Ok(<$ty>::INFINITY),
                        "-Infinity" => Ok(<$ty>::NEG_INFINITY),
                        t => t
                            .parse::<$ty>()
                            .map_err(|e| format!("'{t}' is not a valid {}: {e}", stringify!($ty))),
                    }
                }
            }
        )*
    };
}

scalar_float!(f32, f64);

impl ScalarValue for Url {
    fn to_text(&self) -> String {
        self.as_str().to_string()
    }

    fn from_text(text: &str) -> Result<Self, String> {
        let trimmed = text.trim();
        Url::parse(trimmed).map_err(|e| format!("'{trimmed}' is not a valid URI: {e}"))
    }
}

impl ScalarValue for DateTime<Utc> {
    fn to_text(&self) -> String {
        self.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    fn from_text(text: &str) -> Result<Self, String> {
        let trimmed = text.trim();
        DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("'{trimmed}' is not a valid date-time: {e}"))
    }
}

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

impl ScalarValue for NaiveDateTime {
    fn to_text(&self) -> String {
        self.format(NAIVE_FORMAT).to_string()
    }

    fn from_text(text: &str) -> Result<Self, String> {
        let trimmed = text.trim();
        NaiveDateTime::parse_from_str(trimmed, NAIVE_FORMAT)
            .map_err(|e| format!("'{trimmed}' is not a valid date-time: {e}"))
    }
}

impl ScalarValue for Duration {
    fn to_text(&self) -> String {
        let total = self.as_secs();
        let days = total / 86_400;
        let hours = (total % 86_400) / 3_600;
        let minutes = (total % 3_600) / 60;
        let seconds = total % 60;
        let nanos = self.subsec_nanos();

        let mut out = String::new();
        if days > 0 {
            out.push_str(&format!("{days}."));
        }
        out.push_str(&format!("{hours:02}:{minutes:02}:{seconds:02}"));
        if nanos > 0 {
            let frac = format!("{nanos:09}");
            out.push('.');
            out.push_str(frac.trim_end_matches('0'));
        }
        out
    }

    fn from_text(text: &str) -> Result<Self, String> {
        let trimmed = text.trim();
        parse_time_span(trimmed).ok_or_else(|| format!("'{trimmed}' is not a valid time span"))
    }
}

/// Parse `[d.]hh:mm:ss[.fffffffff]`.
fn parse_time_span(text: &str) -> Option<Duration> {
    let mut parts = text.splitn(3, ':');
    let (head, minutes, rest) = (parts.next()?, parts.next()?, parts.next()?);

    let (days, hours) = match head.split_once('.') {
        Some((d, h)) => (d.parse::<u64>().ok()?, h.parse::<u64>().ok()?),
        None => (0, head.parse::<u64>().ok()?),
    };
    let minutes = minutes.parse::<u64>().ok()?;
    let (seconds, nanos) = match rest.split_once('.') {
        Some((s, frac)) => {
            if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let padded = format!("{frac:0<9}");
            (s.parse::<u64>().ok()?, padded.parse::<u32>().ok()?)
        }
        None => (rest.parse::<u64>().ok()?, 0),
    };
    if hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }

    let secs = days
        .checked_mul(86_400)?
        .checked_add(hours * 3_600 + minutes * 60 + seconds)?;
    Some(Duration::new(secs, nanos))
}

/// The nullable form of any scalar. `None` is never written, and a missing
/// node reads back as `None`.
impl<T: ScalarValue> ScalarValue for Option<T> {
    fn to_text(&self) -> String {
        self.as_ref().map(ScalarValue::to_text).unwrap_or_default()
    }

    fn from_text(text: &str) -> Result<Self, String> {
        T::from_text(text).map(Some)
    }

    fn is_null(&self) -> bool {
        self.is_none()
    }

    fn absent() -> Option<Self> {
        Some(None)
    }
}

/// Declare a plain enum whose variants are stored by name.
///
/// ```ignore
/// config_enum! {
///     #[derive(Default)]
///     pub enum Mode { #[default] Fast, Slow }
/// }
/// ```
#[macro_export]
macro_rules! config_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),*
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $($name::$variant => f.write_str(stringify!($variant))),*
                }
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.trim().eq_ignore_ascii_case(stringify!($variant)) {
                        return Ok($name::$variant);
                    }
                )*
                Err(format!("'{}' is not a valid {}", s.trim(), stringify!($name)))
            }
        }

        impl $crate::scalar::ScalarValue for $name {
            fn to_text(&self) -> String {
                self.to_string()
            }

            fn from_text(text: &str) -> Result<Self, String> {
                text.parse()
            }
        }
    };
}
