use std::borrow::Cow;

use serde_json::Value;
use thiserror::Error;

/// Most digits accepted after the decimal point. Anything finer than ~10 cm
/// is treated as spoofed or garbage input.
pub const MAX_DECIMAL_DIGITS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CoordinateError {
    #[error("Latitude e longitude são obrigatórias")]
    Missing,
    #[error("Latitude e longitude devem ser números válidos")]
    NotANumber,
    #[error("Coordenadas fora do range válido")]
    OutOfRange,
    #[error("Coordenadas com precisão excessiva")]
    ExcessivePrecision,
}

enum RawInput<'a> {
    Missing,
    Text(Cow<'a, str>),
    Unsupported,
}

impl<'a> RawInput<'a> {
    fn classify(value: Option<&'a Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Missing,
            Some(Value::String(s)) if s.trim().is_empty() => Self::Missing,
            Some(Value::String(s)) => Self::Text(Cow::Borrowed(s.trim())),
            Some(Value::Number(n)) => Self::Text(Cow::Owned(n.to_string())),
            Some(_) => Self::Unsupported,
        }
    }

    fn text(&self) -> Result<&str, CoordinateError> {
        match self {
            Self::Text(text) => Ok(text.as_ref()),
            Self::Missing => Err(CoordinateError::Missing),
            Self::Unsupported => Err(CoordinateError::NotANumber),
        }
    }
}

/// Validate a latitude/longitude pair as received in a request body.
///
/// Values may be JSON numbers or numeric strings. The precision limit is
/// applied to the text as sent, not to the parsed float.
pub fn validate_coordinates(
    latitude: Option<&Value>,
    longitude: Option<&Value>,
) -> Result<Coordinates, CoordinateError> {
    let lat_raw = RawInput::classify(latitude);
    let lng_raw = RawInput::classify(longitude);

    if matches!(lat_raw, RawInput::Missing) || matches!(lng_raw, RawInput::Missing) {
        return Err(CoordinateError::Missing);
    }

    let lat_text = lat_raw.text()?;
    let lng_text = lng_raw.text()?;

    let latitude = parse_finite(lat_text)?;
    let longitude = parse_finite(lng_text)?;

    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(CoordinateError::OutOfRange);
    }

    if decimal_digits(lat_text) > MAX_DECIMAL_DIGITS || decimal_digits(lng_text) > MAX_DECIMAL_DIGITS {
        return Err(CoordinateError::ExcessivePrecision);
    }

    Ok(Coordinates { latitude, longitude })
}

fn parse_finite(text: &str) -> Result<f64, CoordinateError> {
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or(CoordinateError::NotANumber)
}

/// Digits written between the decimal point and the end of the mantissa. An
/// exponent is not applied, so `1.5e-3` counts as one digit.
fn decimal_digits(text: &str) -> usize {
    text.split_once('.')
        .map(|(_, fraction)| fraction.chars().take_while(char::is_ascii_digit).count())
        .unwrap_or(0)
}
