//! C ABI decisions for a chosen target.
//!
//! Maps the language's linkage modifiers and external-name conventions onto
//! IR linkage, visibility and calling conventions. Mutual exclusivity of
//! `extern`/`export` is enforced by the parser; this layer trusts its
//! inputs.

use crate::ast;
use crate::ir::{FuncId, Linkage, Module, Type};
use crate::target::{Abi, CallConv, Os, Target};

pub struct CAbi {
    target: Target,
}

impl CAbi {
    pub fn new(target: Target) -> CAbi {
        CAbi { target }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The platform C calling convention. Windows x64 under MSVC uses its
    /// own convention; MinGW keeps the System V convention even on Windows.
    pub fn calling_convention(&self) -> CallConv {
        match self.target.os {
            Os::Windows if self.target.abi == Abi::Msvc => CallConv::Win64,
            _ => CallConv::C,
        }
    }

    pub fn apply_function_attributes(&self, function: &mut crate::ir::Function) {
        function.callconv = self.calling_convention();
    }

    /// Platform symbol mangling for external names. Identity on every
    /// target in scope; the single point to evolve if a platform ever needs
    /// decoration.
    pub fn extern_name(&self, name: &str) -> String {
        name.to_string()
    }

    /// Declares an external function with default visibility and the
    /// platform calling convention applied.
    pub fn declare_extern_function(
        &self,
        module: &mut Module,
        name: &str,
        params: Vec<(String, Type)>,
        ret: Type,
        is_variadic: bool,
    ) -> FuncId {
        module.add_function(
            self.extern_name(name),
            params,
            ret,
            Linkage::External,
            self.calling_convention(),
            is_variadic,
        )
    }

    /// Linkage and calling convention for one parsed function, per the
    /// extern/export flags and the implicit export of `main`.
    pub fn function_abi(&self, function: &ast::Function) -> FunctionAbi {
        let linkage = if function.is_externally_visible() {
            Linkage::External
        } else {
            Linkage::Internal
        };
        FunctionAbi {
            linkage,
            callconv: self.calling_convention(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionAbi {
    pub linkage: Linkage,
    pub callconv: CallConv,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ast_function(name: &str, is_extern: bool, is_export: bool) -> ast::Function {
        ast::Function {
            name: name.to_string(),
            params: Vec::new(),
            return_type: None,
            body: Vec::new(),
            is_extern,
            is_export,
        }
    }

    #[test]
    fn linkage_table() {
        let cabi = CAbi::new(Target::from_triple("x86_64-unknown-linux-gnu"));

        let rows = [
            (ast_function("helper", false, false), Linkage::Internal),
            (ast_function("helper", true, false), Linkage::External),
            (ast_function("helper", false, true), Linkage::External),
            (ast_function("main", false, false), Linkage::External),
        ];
        for (function, expected) in rows {
            let abi = cabi.function_abi(&function);
            assert_eq!(abi.linkage, expected, "function: {:?}", function.name);
            assert_eq!(abi.callconv, CallConv::C);
        }
    }

    #[test]
    fn windows_msvc_selects_win64() {
        let cabi = CAbi::new(Target::from_triple("x86_64-pc-windows-msvc"));
        assert_eq!(cabi.calling_convention(), CallConv::Win64);

        // MinGW stays on the standard C convention.
        let mingw = CAbi::new(Target::from_triple("x86_64-pc-windows"));
        assert_eq!(mingw.calling_convention(), CallConv::C);
    }

    #[test]
    fn extern_names_are_identity_mangled() {
        for triple in [
            "x86_64-unknown-linux-gnu",
            "aarch64-apple-darwin",
            "x86_64-pc-windows-msvc",
        ] {
            let cabi = CAbi::new(Target::from_triple(triple));
            assert_eq!(cabi.extern_name("puts"), "puts", "triple: {triple}");
        }
    }

    #[test]
    fn declares_extern_functions_with_external_linkage() {
        let cabi = CAbi::new(Target::from_triple("x86_64-unknown-linux-gnu"));
        let mut module = Module::new("test", cabi.target().to_triple_string());
        let id = cabi.declare_extern_function(
            &mut module,
            "puts",
            vec![("s".to_string(), Type::Ptr)],
            Type::Int(32),
            false,
        );
        let function = module.function(id);
        assert_eq!(function.linkage, Linkage::External);
        assert_eq!(function.callconv, CallConv::C);
        assert!(function.is_declaration());
    }
}
