//! Query-string and form-body parameter parsing.

use url::form_urlencoded;

use crate::protocol::ProtocolError;

/// Append the `name=value` pairs of `input` (split on `&`, percent and `+`
/// decoded) to `params`, failing once the total would exceed `limit`.
pub fn parse_into(
    params: &mut Vec<(String, String)>,
    input: &[u8],
    limit: usize,
) -> Result<(), ProtocolError> {
    for (name, value) in form_urlencoded::parse(input) {
        if params.len() >= limit {
            return Err(ProtocolError::TooManyParameters(limit));
        }
        params.push((name.into_owned(), value.into_owned()));
    }
    Ok(())
}
