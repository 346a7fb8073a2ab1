use filterproxy_common::{
    error::{ProxyError, Result},
    types::LabelFilter,
};

/// Turns a raw query string into label constraints.
///
/// Every key must appear at most once; a repeated key is ambiguous and
/// rejected.
pub fn parse_label_filter(query: Option<&str>) -> Result<LabelFilter> {
    let mut constraints = LabelFilter::new();
    let Some(query) = query else {
        return Ok(constraints);
    };

    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if constraints.contains_key(&*name) {
            return Err(ProxyError::InvalidQuery(format!(
                "label {name} given more than once"
            )));
        }
        constraints.insert(name.into_owned(), value.into_owned());
    }
    Ok(constraints)
}
