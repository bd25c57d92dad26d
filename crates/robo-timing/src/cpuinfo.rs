//! Parsing of the kernel CPU description (`/proc/cpuinfo`).
//!
//! The format is newline-separated `key : value` records owned by the kernel.
//! Only the first `cpu MHz` record is used. Nothing here touches the
//! filesystem, so the scanning rules can be exercised with crafted input.

use robo_common::TimingError;

/// Label of the clock-rate record, whitespace included.
pub const CPU_MHZ_LABEL: &[u8] = b"cpu MHz\t\t: ";

/// Extract the clock rate in MHz from a CPU description buffer.
///
/// The value runs from the end of the first [`CPU_MHZ_LABEL`] to the next
/// newline inside `buf`; a buffer cut off before that newline is malformed.
/// The value text is read like C `strtod`: leading whitespace is skipped,
/// the longest numeric prefix wins, and text with no numeric prefix reads as
/// zero.
///
/// # Errors
///
/// - [`TimingError::MissingLabel`] if the label is absent.
/// - [`TimingError::UnterminatedValue`] if no newline follows the label.
/// - [`TimingError::OutOfRange`] for infinite, NaN or negative values, and
///   for rates too large to count in a `u64`.
pub fn parse_cpu_mhz(buf: &[u8]) -> Result<f64, TimingError> {
    let label_at = find(buf, CPU_MHZ_LABEL).ok_or(TimingError::MissingLabel)?;
    let value = &buf[label_at + CPU_MHZ_LABEL.len()..];

    let line_end = value
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(TimingError::UnterminatedValue)?;
    let text = &value[..line_end];

    let mhz = parse_leading_float(text);
    if !mhz.is_finite() || mhz < 0.0 || mhz >= u64::MAX as f64 {
        return Err(TimingError::OutOfRange {
            text: String::from_utf8_lossy(text).into_owned(),
        });
    }
    Ok(mhz)
}

/// MHz is numerically cycles per microsecond; the fraction is dropped.
#[inline]
#[must_use]
pub fn mhz_to_cycles_per_us(mhz: f64) -> u64 {
    mhz as u64
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_leading_float(text: &[u8]) -> f64 {
    let start = text
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(text.len());
    let s = &text[start..];

    let mut i = 0;
    let negative = match s.first() {
        Some(b'-') => {
            i = 1;
            true
        }
        Some(b'+') => {
            i = 1;
            false
        }
        _ => false,
    };

    let word = &s[i..];
    if starts_with_ignore_case(word, b"inf") {
        return if negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }
    if starts_with_ignore_case(word, b"nan") {
        return f64::NAN;
    }

    let int_start = i;
    i += count_digits(&s[i..]);
    let mut mantissa_digits = i - int_start;
    if s.get(i) == Some(&b'.') {
        i += 1;
        let frac = count_digits(&s[i..]);
        i += frac;
        mantissa_digits += frac;
    }
    if mantissa_digits == 0 {
        return 0.0;
    }

    if matches!(s.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(s.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let exp_digits = count_digits(&s[j.min(s.len())..]);
        if exp_digits > 0 {
            i = j + exp_digits;
        }
    }

    // The prefix is pure ASCII by construction.
    std::str::from_utf8(&s[..i])
        .ok()
        .and_then(|t| t.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn count_digits(s: &[u8]) -> usize {
    s.iter().take_while(|b| b.is_ascii_digit()).count()
}

fn starts_with_ignore_case(s: &[u8], prefix: &[u8]) -> bool {
    s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}
