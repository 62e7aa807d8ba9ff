use std::fmt;

use aliri_braid::braid;

/// Keeps a secret out of logs
///
/// Both `{}` and `{:?}` print only a label. `{:#?}` shows the first
/// `reveal` characters followed by an ellipsis.
macro_rules! redacted {
    ($ty:ty, $label:literal, reveal = $reveal:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    write!(f, "\"{}…\"", prefix(&self.0, $reveal))
                } else {
                    f.write_str(concat!("<", $label, ">"))
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(concat!("<", $label, ">"))
            }
        }
    };
}

fn prefix(secret: &str, chars: usize) -> &str {
    let end = secret
        .char_indices()
        .nth(chars)
        .map_or(secret.len(), |(idx, _)| idx);
    &secret[..end]
}

/// A key authorizing this service to the identity provider
#[braid(serde, debug = "owned", display = "owned")]
pub struct ApiKey;

redacted!(ApiKeyRef, "API KEY", reveal = 4);

/// A user's password, forwarded to the identity provider
#[braid(serde, debug = "owned", display = "owned")]
pub struct Password;

redacted!(PasswordRef, "PASSWORD", reveal = 0);

/// A refresh token issued by the identity provider
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

redacted!(RefreshTokenRef, "REFRESH TOKEN", reveal = 6);
