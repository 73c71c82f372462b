//! The append-only sink for QBE text. Every other component emits through
//! [`IlBuilder`]; nothing else touches the output buffer directly except
//! through [`IlBuilder::raw`], the escape hatch for constructs that don't
//! fit the typed helpers below.
//!
//! Owns the three pieces of truly global mutable state: the output text,
//! the temporary/label counters, and the string-constant pool. The pool
//! uses insertion-ordered storage rather than a hash map specifically so
//! that emission order is deterministic across runs and platforms (see the
//! design notes on `std::collections::HashMap` iteration order not being a
//! build-reproducibility guarantee).

use crate::types::QbeType;
use std::collections::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Four,
    Eight,
    Sixteen,
}

impl Align {
    pub fn bytes(self) -> u32 {
        match self {
            Align::Four => 4,
            Align::Eight => 8,
            Align::Sixteen => 16,
        }
    }

    /// Default heuristic from the design: size <=4 -> align4, <=8 -> align8,
    /// otherwise align8 unless the caller explicitly asks for 16 (UDTs
    /// tagged SIMD-eligible).
    pub fn for_size(size: u32) -> Align {
        if size <= 4 {
            Align::Four
        } else if size <= 8 {
            Align::Eight
        } else {
            Align::Eight
        }
    }
}

/// The base comparison predicate before it is specialized by operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparePred {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparePred {
    fn letters(self) -> &'static str {
        match self {
            ComparePred::Eq => "eq",
            ComparePred::Ne => "ne",
            ComparePred::Lt => "lt",
            ComparePred::Le => "le",
            ComparePred::Gt => "gt",
            ComparePred::Ge => "ge",
        }
    }

    /// Resolve to the concrete QBE comparison mnemonic for `operand_type`.
    /// Integer ordering comparisons get QBE's `cs` (signed) prefix; equality
    /// comparisons on integers use plain `c`; floats never take a sign
    /// prefix at all. This is the one place that quirk is encoded.
    pub fn mnemonic(self, operand_type: QbeType) -> String {
        match operand_type {
            QbeType::W | QbeType::L => {
                let ty = operand_type.letter();
                match self {
                    ComparePred::Eq | ComparePred::Ne => format!("c{}{}", self.letters(), ty),
                    _ => format!("cs{}{}", self.letters(), ty),
                }
            }
            QbeType::S | QbeType::D => {
                format!("c{}{}", self.letters(), operand_type.letter())
            }
        }
    }
}

pub struct IlBuilder {
    output: String,
    temp_counter: u64,
    label_counter: u64,
    /// value -> label, in first-registration order.
    string_pool: Vec<(String, String)>,
    string_pool_index: HashMap<String, String>,
    /// Index into `string_pool` of the first entry not yet flushed by
    /// `emit_pool`/`emit_late_pool`.
    string_pool_flushed: usize,
    function_open: bool,
}

impl IlBuilder {
    pub fn new() -> Self {
        IlBuilder {
            output: String::new(),
            temp_counter: 0,
            label_counter: 0,
            string_pool: Vec::new(),
            string_pool_index: HashMap::new(),
            string_pool_flushed: 0,
            function_open: false,
        }
    }

    pub fn finish(self) -> String {
        self.output
    }

    pub fn text(&self) -> &str {
        &self.output
    }

    /// Escape hatch: append raw text verbatim. Used for constructs with no
    /// dedicated helper (e.g. one-off runtime trampolines).
    pub fn raw(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn warn(&mut self, message: &str) {
        let _ = writeln!(self.output, "# WARNING: {}", message);
    }

    pub fn error_comment(&mut self, message: &str) {
        let _ = writeln!(self.output, "# ERROR: {}", message);
    }

    // -- function framing -----------------------------------------------

    pub fn open_function(&mut self, name: &str, return_type: Option<QbeType>, params: &[(QbeType, String)]) {
        if self.function_open {
            self.warn(&format!(
                "open_function({}) called while another function is still open",
                name
            ));
        }
        self.temp_counter = 0;
        self.function_open = true;
        let rt = return_type.map(|t| t.to_string()).unwrap_or_default();
        let param_list = params
            .iter()
            .map(|(ty, name)| format!("{} %{}", ty, name))
            .collect::<Vec<_>>()
            .join(", ");
        let export_rt = if rt.is_empty() {
            format!("export function ${}(", name)
        } else {
            format!("export function {} ${}(", rt, name)
        };
        let _ = writeln!(self.output, "{}{}) {{", export_rt, param_list);
    }

    pub fn close_function(&mut self) {
        if !self.function_open {
            self.warn("close_function called with no function open");
        }
        let _ = writeln!(self.output, "}}\n");
        self.function_open = false;
    }

    // -- labels & temporaries ---------------------------------------------

    pub fn emit_label(&mut self, name: &str) {
        let _ = writeln!(self.output, "@{}", name);
    }

    pub fn new_temp(&mut self) -> String {
        let name = format!("%t.{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    /// Process-lifetime-unique numeric label, e.g. for synthesized
    /// constructs (`lbl_N`).
    pub fn new_label_id(&mut self) -> u64 {
        let id = self.label_counter;
        self.label_counter += 1;
        id
    }

    // -- arithmetic & comparison ------------------------------------------

    pub fn binary(&mut self, op: &str, ty: QbeType, lhs: &str, rhs: &str) -> String {
        let dest = self.new_temp();
        let _ = writeln!(self.output, "{} ={} {} {}, {}", dest, ty, op, lhs, rhs);
        dest
    }

    pub fn compare(&mut self, pred: ComparePred, operand_type: QbeType, lhs: &str, rhs: &str) -> String {
        let dest = self.new_temp();
        let mnemonic = pred.mnemonic(operand_type);
        let _ = writeln!(self.output, "{} =w {} {}, {}", dest, mnemonic, lhs, rhs);
        dest
    }

    // -- memory -------------------------------------------------------------

    pub fn load(&mut self, ty: QbeType, address: &str) -> String {
        let dest = self.new_temp();
        let _ = writeln!(self.output, "{} ={} load{} {}", dest, ty, ty, address);
        dest
    }

    pub fn store(&mut self, ty: QbeType, value: &str, address: &str) {
        let _ = writeln!(self.output, "store{} {}, {}", ty, value, address);
    }

    pub fn alloc(&mut self, align: Align, size: u32) -> String {
        let dest = self.new_temp();
        let _ = writeln!(self.output, "{} =l alloc{} {}", dest, align.bytes(), size);
        dest
    }

    /// Allocate a stack slot under an explicit name rather than a fresh
    /// temp. Used for entry-block locals/parameters, which keep one stable
    /// slot for the whole function instead of SSA-renaming on each use.
    pub fn alloc_named(&mut self, name: &str, align: Align, size: u32) {
        let _ = writeln!(self.output, "{} =l alloc{} {}", name, align.bytes(), size);
    }

    // -- control --------------------------------------------------------

    pub fn jmp(&mut self, target: &str) {
        let _ = writeln!(self.output, "jmp @{}", target);
    }

    pub fn jnz(&mut self, cond: &str, if_true: &str, if_false: &str) {
        let _ = writeln!(self.output, "jnz {}, @{}, @{}", cond, if_true, if_false);
    }

    pub fn ret(&mut self, value: Option<&str>) {
        match value {
            Some(v) => {
                let _ = writeln!(self.output, "ret {}", v);
            }
            None => {
                let _ = writeln!(self.output, "ret");
            }
        }
    }

    /// Emits a linear comparison-chain switch: `selector == case[i] -> Li`,
    /// falling through to `default_label` when nothing matches.
    pub fn emit_switch(&mut self, selector: &str, cases: &[String], default_label: &str) {
        for (i, label) in cases.iter().enumerate() {
            let cmp = self.compare(ComparePred::Eq, QbeType::W, selector, &i.to_string());
            let next = format!("switch_next_{}", self.new_label_id());
            self.jnz(&cmp, label, &next);
            self.emit_label(&next);
        }
        self.jmp(default_label);
    }

    // -- calls ------------------------------------------------------------

    pub fn call(&mut self, dest_type: Option<QbeType>, name: &str, args: &[(QbeType, String)]) -> Option<String> {
        let arg_list = args
            .iter()
            .map(|(ty, v)| format!("{} {}", ty, v))
            .collect::<Vec<_>>()
            .join(", ");
        match dest_type {
            Some(ty) => {
                let dest = self.new_temp();
                let _ = writeln!(self.output, "{} ={} call ${}({})", dest, ty, name, arg_list);
                Some(dest)
            }
            None => {
                let _ = writeln!(self.output, "call ${}({})", name, arg_list);
                None
            }
        }
    }

    // -- conversion ---------------------------------------------------------

    pub fn convert(&mut self, mnemonic: &str, dest_type: QbeType, value: &str) -> String {
        let dest = self.new_temp();
        let _ = writeln!(self.output, "{} ={} {} {}", dest, dest_type, mnemonic, value);
        dest
    }

    pub fn copy(&mut self, ty: QbeType, value: &str) -> String {
        let dest = self.new_temp();
        let _ = writeln!(self.output, "{} ={} copy {}", dest, ty, value);
        dest
    }

    // -- data section -------------------------------------------------------

    pub fn data_zero(&mut self, label: &str, bytes: u32, exported: bool) {
        let prefix = if exported { "export data" } else { "data" };
        let _ = writeln!(self.output, "{} ${} = {{ z {} }}", prefix, label, bytes);
    }

    pub fn data_words(&mut self, label: &str, words: &[i64], exported: bool) {
        let prefix = if exported { "export data" } else { "data" };
        let body = words
            .iter()
            .map(|w| format!("w {}", w))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(self.output, "{} ${} = {{ {} }}", prefix, label, body);
    }

    fn data_string_literal(&mut self, label: &str, value: &str) {
        let escaped = escape_string(value);
        let _ = writeln!(self.output, "data ${} = {{ b \"{}\", b 0 }}", label, escaped);
    }

    // -- string pool ------------------------------------------------------

    pub fn register_string(&mut self, value: &str) -> String {
        if let Some(label) = self.string_pool_index.get(value) {
            return label.clone();
        }
        let label = format!("str_{}", self.string_pool.len());
        self.string_pool.push((value.to_string(), label.clone()));
        self.string_pool_index.insert(value.to_string(), label.clone());
        label
    }

    /// Dump every string registered so far. Called once, before any
    /// function, by the program driver.
    pub fn emit_pool(&mut self) {
        let entries: Vec<(String, String)> = self.string_pool.clone();
        for (value, label) in &entries[self.string_pool_flushed..] {
            self.data_string_literal(label, value);
        }
        self.string_pool_flushed = self.string_pool.len();
    }

    /// Dump any strings registered after `emit_pool` (e.g. diagnostic
    /// strings emitted mid-codegen). Called once, after all functions.
    pub fn emit_late_pool(&mut self) {
        self.emit_pool();
    }
}

impl Default for IlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape a string for a QBE `b "..."` data literal: printable ASCII passes
/// through, `\n \r \t \\ \"` use their standard escapes, and anything else
/// outside `[32, 126]` becomes `\xHH`.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            32..=126 => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\x{:02x}", byte);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_handles_control_and_quotes() {
        assert_eq!(escape_string("hi"), "hi");
        assert_eq!(escape_string("a\nb"), "a\\nb");
        assert_eq!(escape_string("a\"b"), "a\\\"b");
        assert_eq!(escape_string("\x01"), "\\x01");
    }

    #[test]
    fn string_pool_dedupes_and_preserves_order() {
        let mut b = IlBuilder::new();
        let l1 = b.register_string("hello");
        let l2 = b.register_string("world");
        let l3 = b.register_string("hello");
        assert_eq!(l1, l3);
        assert_ne!(l1, l2);
        assert_eq!(l1, "str_0");
        assert_eq!(l2, "str_1");
    }

    #[test]
    fn emit_pool_then_late_pool_flushes_each_once() {
        let mut b = IlBuilder::new();
        b.register_string("a");
        b.emit_pool();
        b.register_string("b");
        b.emit_late_pool();
        let text = b.finish();
        assert_eq!(text.matches("str_0").count(), 1);
        assert_eq!(text.matches("str_1").count(), 1);
    }

    #[test]
    fn compare_mnemonics_follow_qbe_quirks() {
        assert_eq!(ComparePred::Lt.mnemonic(QbeType::W), "csltw");
        assert_eq!(ComparePred::Lt.mnemonic(QbeType::D), "cltd");
        assert_eq!(ComparePred::Eq.mnemonic(QbeType::L), "ceql");
    }

    #[test]
    fn temp_counter_resets_per_function() {
        let mut b = IlBuilder::new();
        let _ = b.new_temp();
        let _ = b.new_temp();
        b.open_function("f", None, &[]);
        let t = b.new_temp();
        assert_eq!(t, "%t.0");
    }
}
