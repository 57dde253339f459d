use std::collections::BTreeMap;

/// One template's source text, keyed by its qualified name.
#[salsa::input(debug)]
pub struct SourceTemplate {
    #[returns(ref)]
    pub name: String,
    #[returns(ref)]
    pub text: String,
}

/// Every template currently known to the database.
///
/// Template calls are resolved through this input so that adding or removing
/// a template invalidates the analyses that looked it up.
#[salsa::input(debug)]
pub struct TemplateSet {
    #[returns(ref)]
    pub templates: BTreeMap<String, SourceTemplate>,
}
