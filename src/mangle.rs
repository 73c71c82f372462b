//! Maps BASIC identifiers (which may carry a type-sigil suffix and
//! otherwise-invalid characters) onto QBE identifiers, and tracks the
//! per-routine scope (current function, parameters, `SHARED` set) that
//! mangling and codegen both need.

use std::collections::{HashMap, HashSet};

/// QBE's reserved instruction/type keywords. Any mangled name that
/// collides with one of these gets a `_` prefix.
const RESERVED_WORDS: &[&str] = &[
    "w", "l", "s", "d", "b", "h", "add", "sub", "mul", "div", "rem", "and", "or", "xor", "sar",
    "shr", "shl", "neg", "loadw", "loadl", "loads", "loadd", "loadsw", "loaduw", "loadsh",
    "loaduh", "loadsb", "loadub", "storew", "storel", "stores", "stored", "storeh", "storeb",
    "alloc4", "alloc8", "alloc16", "jmp", "jnz", "ret", "call", "phi", "copy", "blit", "ceqw",
    "ceql", "ceqs", "ceqd", "cnew", "cnel", "cnes", "cned", "csltw", "csltl", "cslew", "cslel",
    "csgtw", "csgtl", "csgew", "csgel", "cltd", "clts", "cled", "cles", "cgtd", "cgts", "cged",
    "cges", "extsw", "extuw", "extsh", "extuh", "extsb", "extub", "exts", "truncd", "stosi",
    "dtosi", "swtof", "sltof", "export", "function", "data", "type", "align", "section",
    "env", "vastart", "vaarg", "par", "envpar", "ubyte", "sbyte", "uhalf", "shalf",
];

fn is_reserved(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

fn sanitize(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        return "_unnamed".to_string();
    }
    if out.chars().next().unwrap().is_ascii_digit() {
        out.insert(0, '_');
    }
    out
}

/// Strips a trailing BASIC type sigil and returns `(base_name, suffix)`.
fn strip_sigil(name: &str) -> (&str, &'static str) {
    match name.chars().last() {
        Some('%') => (&name[..name.len() - 1], "_int"),
        Some('&') => (&name[..name.len() - 1], "_lng"),
        Some('!') => (&name[..name.len() - 1], "_sng"),
        Some('#') => (&name[..name.len() - 1], "_dbl"),
        Some('$') => (&name[..name.len() - 1], "_str"),
        _ => (name, ""),
    }
}

fn mangle_base(name: &str) -> String {
    let (base, suffix) = strip_sigil(name);
    let mut sanitized = sanitize(base);
    if is_reserved(&sanitized) {
        sanitized.insert(0, '_');
    }
    if suffix.is_empty() {
        sanitized
    } else {
        format!("{}{}", sanitized, suffix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    GlobalVar,
    LocalVar,
    GlobalArray,
    LocalArray,
    ArrayDesc,
    Sub,
    Function,
    DefFn,
    Method,
}

pub struct NameMangler {
    cache: HashMap<(bool, String), String>,
    label_counter: u64,
    current_function: Option<String>,
    parameters: Vec<String>,
    shared: HashSet<String>,
}

impl NameMangler {
    pub fn new() -> Self {
        NameMangler {
            cache: HashMap::new(),
            label_counter: 0,
            current_function: None,
            parameters: Vec::new(),
            shared: HashSet::new(),
        }
    }

    fn mangled(&mut self, is_global: bool, basic_name: &str, kind: Kind) -> String {
        let key = (is_global, basic_name.to_string());
        if let Some(existing) = self.cache.get(&key) {
            return existing.clone();
        }
        let prefix = match kind {
            Kind::GlobalVar => "$var_",
            Kind::LocalVar => "%var_",
            Kind::GlobalArray => "$arr_",
            Kind::LocalArray => "%arr_",
            Kind::ArrayDesc => "$arr_desc_",
            Kind::Sub => "$sub_",
            Kind::Function => "$func_",
            Kind::DefFn => "$deffn_",
            Kind::Method => "$method_",
        };
        let name = format!("{}{}", prefix, mangle_base(basic_name));
        self.cache.insert(key, name.clone());
        name
    }

    pub fn global_variable(&mut self, basic_name: &str) -> String {
        self.mangled(true, basic_name, Kind::GlobalVar)
    }

    pub fn local_variable(&mut self, basic_name: &str) -> String {
        self.mangled(false, basic_name, Kind::LocalVar)
    }

    pub fn global_array(&mut self, basic_name: &str) -> String {
        self.mangled(true, basic_name, Kind::GlobalArray)
    }

    pub fn local_array(&mut self, basic_name: &str) -> String {
        self.mangled(false, basic_name, Kind::LocalArray)
    }

    pub fn array_descriptor(&mut self, basic_name: &str) -> String {
        self.mangled(true, basic_name, Kind::ArrayDesc)
    }

    pub fn sub_name(&mut self, basic_name: &str) -> String {
        self.mangled(true, basic_name, Kind::Sub)
    }

    pub fn function_name(&mut self, basic_name: &str) -> String {
        self.mangled(true, basic_name, Kind::Function)
    }

    pub fn def_fn_name(&mut self, basic_name: &str) -> String {
        self.mangled(true, basic_name, Kind::DefFn)
    }

    /// Statically-known dispatch target for a `MethodCall` receiver.method(...).
    pub fn method_name(&mut self, basic_name: &str) -> String {
        self.mangled(true, basic_name, Kind::Method)
    }

    /// Mangle a BASIC line/label into a QBE label. Purely numeric BASIC
    /// line numbers become `line_<digits>`; everything else becomes
    /// `label_<sanitized>`.
    pub fn label(&self, basic_label: &str) -> String {
        if !basic_label.is_empty() && basic_label.chars().all(|c| c.is_ascii_digit()) {
            format!("line_{}", basic_label)
        } else {
            format!("label_{}", sanitize(basic_label))
        }
    }

    /// A fresh, process-lifetime-unique label for synthesized constructs
    /// (e.g. `on_gosub_trampoline`, `return_error`).
    pub fn unique_label(&mut self, prefix: &str) -> String {
        let id = self.label_counter;
        self.label_counter += 1;
        format!("{}_{}", prefix, id)
    }

    // -- scope ------------------------------------------------------------

    pub fn enter_function_scope(&mut self, name: &str, parameters: &[String]) {
        self.current_function = Some(name.to_string());
        self.parameters = parameters.to_vec();
        self.shared.clear();
    }

    pub fn add_shared_variable(&mut self, name: &str) {
        self.shared.insert(name.to_string());
    }

    pub fn exit_function_scope(&mut self) {
        self.current_function = None;
        self.parameters.clear();
        self.shared.clear();
    }

    pub fn current_function(&self) -> Option<&str> {
        self.current_function.as_deref()
    }

    pub fn is_parameter(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p == name)
    }

    pub fn is_shared(&self, name: &str) -> bool {
        self.shared.contains(name)
    }
}

impl Default for NameMangler {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that pops the current function scope on drop, guaranteeing
/// the mangler's scope state is released on every path out of routine
/// codegen -- including early returns on error.
pub struct FunctionScopeGuard<'a> {
    mangler: &'a mut NameMangler,
}

impl<'a> FunctionScopeGuard<'a> {
    pub fn enter(mangler: &'a mut NameMangler, name: &str, parameters: &[String]) -> Self {
        mangler.enter_function_scope(name, parameters);
        FunctionScopeGuard { mangler }
    }
}

impl Drop for FunctionScopeGuard<'_> {
    fn drop(&mut self) {
        self.mangler.exit_function_scope();
    }
}

impl std::ops::Deref for FunctionScopeGuard<'_> {
    type Target = NameMangler;
    fn deref(&self) -> &NameMangler {
        self.mangler
    }
}

impl std::ops::DerefMut for FunctionScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut NameMangler {
        self.mangler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigils_map_to_suffixes() {
        let mut m = NameMangler::new();
        assert_eq!(m.global_variable("X%"), "$var_X_int");
        assert_eq!(m.global_variable("A$"), "$var_A_str");
        assert_eq!(m.global_variable("D#"), "$var_D_dbl");
    }

    #[test]
    fn reserved_words_get_escaped() {
        let mut m = NameMangler::new();
        // "w" is a reserved QBE type letter.
        assert_eq!(m.local_variable("w"), "%var__w");
    }

    #[test]
    fn same_name_always_maps_to_same_symbol() {
        let mut m = NameMangler::new();
        let a = m.global_variable("Count");
        let b = m.global_variable("Count");
        assert_eq!(a, b);
    }

    #[test]
    fn global_and_local_scopes_can_differ_for_same_basic_name() {
        let mut m = NameMangler::new();
        let g = m.global_variable("X");
        let l = m.local_variable("X");
        assert_ne!(g, l);
    }

    #[test]
    fn numeric_labels_become_line_labels() {
        let m = NameMangler::new();
        assert_eq!(m.label("100"), "line_100");
        assert_eq!(m.label("Loop"), "label_Loop");
    }

    #[test]
    fn scope_guard_clears_on_drop() {
        let mut m = NameMangler::new();
        {
            let _guard = FunctionScopeGuard::enter(&mut m, "Foo", &["A".to_string()]);
            assert_eq!(m.current_function(), Some("Foo"));
            assert!(m.is_parameter("A"));
        }
        assert_eq!(m.current_function(), None);
        assert!(!m.is_parameter("A"));
    }
}
