//! AST to IR lowering.
//!
//! Functions lower in declaration order: prototype, entry block, parameter
//! slots, body statements, implicit void return, then structural
//! verification of the whole module. Locals live in stack slots and every
//! read goes through a load, so no dominance bookkeeping is needed.
//!
//! Two behaviors here are deliberate quirks carried over from the language
//! definition: the ordering operators `< <= > >=` lower to *unsigned*
//! comparisons even though number literals narrow using signed ranges, and
//! the for-loop bound compares *signed* less-than. Both are observable and
//! documented rather than unified.

use std::collections::HashMap;

use crate::ast::{BinaryOp, Expr, Function};
use crate::cabi::CAbi;
use crate::error::CoreError;
use crate::ir::{BlockId, FuncId, FunctionBuilder, IcmpPred, Module, Type, Value};

/// Lowers `functions` into a fresh module for the ABI's target.
pub fn generate(
    functions: &[Function],
    cabi: &CAbi,
    module_name: &str,
) -> Result<Module, CoreError> {
    let mut module = Module::new(module_name, cabi.target().to_triple_string());

    for function in functions {
        lower_function(&mut module, cabi, function)?;
    }

    module.verify().map_err(CoreError::Backend)?;
    Ok(module)
}

/// Narrowest primitive width whose signed or unsigned range contains the
/// literal.
fn literal_width(value: i64) -> u32 {
    if (-128..=255).contains(&value) {
        8
    } else if (-32768..=65535).contains(&value) {
        16
    } else if (-(1i64 << 31)..=(1i64 << 32) - 1).contains(&value) {
        32
    } else {
        64
    }
}

/// Textual type name to IR type. Slices and `str` share the `{ ptr, i64 }`
/// aggregate; the element type of a slice is still validated recursively.
fn lower_type(name: &str) -> Result<Type, CoreError> {
    match name {
        "u8" | "i8" => Ok(Type::Int(8)),
        "u16" | "i16" => Ok(Type::Int(16)),
        "u32" | "i32" => Ok(Type::Int(32)),
        "bool" => Ok(Type::Int(1)),
        "str" => Ok(Type::slice()),
        _ => {
            if let Some(element) = name.strip_prefix("[]") {
                lower_type(element)?;
                Ok(Type::slice())
            } else {
                Err(CoreError::Semantic(format!("unknown type: {name}")))
            }
        }
    }
}

fn lower_function(module: &mut Module, cabi: &CAbi, function: &Function) -> Result<(), CoreError> {
    let mut params = Vec::with_capacity(function.params.len());
    for (name, type_name) in &function.params {
        params.push((name.clone(), lower_type(type_name)?));
    }
    let ret = match &function.return_type {
        Some(name) => lower_type(name)?,
        None => Type::Void,
    };

    if function.is_extern {
        cabi.declare_extern_function(module, &function.name, params, ret, false);
        return Ok(());
    }

    let abi = cabi.function_abi(function);
    let func = module.add_function(
        function.name.clone(),
        params,
        ret,
        abi.linkage,
        abi.callconv,
        false,
    );

    let mut lowering = FnLowering {
        builder: FunctionBuilder::new(module, func),
        cabi,
        func,
        env: HashMap::new(),
        loops: Vec::new(),
    };
    lowering.bind_params()?;
    lowering.lower_stmts(&function.body)?;

    if function.return_type.is_none() && !lowering.builder.has_terminator() {
        lowering.builder.build_ret_void();
    }

    Ok(())
}

/// A local variable's storage slot.
#[derive(Clone)]
struct Binding {
    slot: Value,
    ty: Type,
    is_const: bool,
}

/// Innermost-loop branch targets, kept as an explicit stack so nesting
/// saves and restores naturally.
struct LoopCtx {
    continue_target: BlockId,
    break_target: BlockId,
}

struct FnLowering<'m, 'c> {
    builder: FunctionBuilder<'m>,
    cabi: &'c CAbi,
    /// The function under construction; libc declarations appended during
    /// lowering mean it is not necessarily the module's last function.
    func: FuncId,
    /// Function-flat symbol environment; cleared per function by
    /// construction. The for-loop variable is the only binding that gets
    /// restored on scope exit.
    env: HashMap<String, Binding>,
    loops: Vec<LoopCtx>,
}

impl FnLowering<'_, '_> {
    fn bind_params(&mut self) -> Result<(), CoreError> {
        let func = self.func;
        let params: Vec<(String, Type)> = self.builder.module().function(func).params.clone();
        for (index, (name, ty)) in params.into_iter().enumerate() {
            let slot = self.builder.build_alloca(ty.clone(), &format!("{name}.addr"));
            self.builder.build_store(Value::Param(index), slot.clone());
            self.env.insert(
                name,
                Binding {
                    slot,
                    ty,
                    is_const: false,
                },
            );
        }
        Ok(())
    }

    /// Lowers a statement list. Once a statement terminates the insertion
    /// block (a `return`, `break` or `continue`), the remaining statements
    /// are unreachable and are not lowered; emitting them would place
    /// instructions after a terminator.
    fn lower_stmts(&mut self, stmts: &[Expr]) -> Result<(), CoreError> {
        for stmt in stmts {
            if self.builder.has_terminator() {
                break;
            }
            self.lower_expr(stmt)?;
        }
        Ok(())
    }

    fn lower_expr(&mut self, expr: &Expr) -> Result<Value, CoreError> {
        match expr {
            Expr::Number(value) => Ok(Value::ConstInt {
                ty: Type::Int(literal_width(*value)),
                value: *value,
            }),
            Expr::Boolean(value) => Ok(Value::ConstInt {
                ty: Type::Int(1),
                value: i64::from(*value),
            }),
            Expr::StringLiteral(text) => Ok(self.lower_string_literal(text)),
            Expr::Variable(name) => {
                let binding = self.lookup(name)?;
                Ok(self
                    .builder
                    .build_load(binding.ty.clone(), binding.slot.clone(), name))
            }
            Expr::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs),
            Expr::Call { callee, args } => self.lower_call(callee, args),
            Expr::Return(value) => {
                let value = self.lower_expr(value)?;
                let ret_ty = self.builder.module().function(self.func).ret.clone();
                let value = self.coerce_int(value, &ret_ty);
                self.builder.build_ret(value);
                Ok(dummy())
            }
            Expr::VarDecl {
                name,
                type_name,
                is_const,
                init,
            } => self.lower_var_decl(name, type_name, *is_const, init.as_deref()),
            Expr::Assign { name, value } => self.lower_assign(name, value),
            Expr::If {
                cond,
                then_body,
                else_body,
            } => self.lower_if(cond, then_body, else_body),
            Expr::While { cond, body } => self.lower_while(cond, body),
            Expr::For {
                var,
                start,
                end,
                body,
            } => self.lower_for(var, start, end, body),
            Expr::Break => {
                let target = self
                    .loops
                    .last()
                    .ok_or_else(|| {
                        CoreError::Semantic("break statement not inside a loop".to_string())
                    })?
                    .break_target;
                self.builder.build_br(target);
                Ok(dummy())
            }
            Expr::Continue => {
                let target = self
                    .loops
                    .last()
                    .ok_or_else(|| {
                        CoreError::Semantic("continue statement not inside a loop".to_string())
                    })?
                    .continue_target;
                self.builder.build_br(target);
                Ok(dummy())
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Binding, CoreError> {
        self.env
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::Semantic(format!("unknown variable name: {name}")))
    }

    /// Integer-to-integer coercion; any other combination is returned
    /// unchanged and left to the verifier.
    fn coerce_int(&mut self, value: Value, to: &Type) -> Value {
        let from = self.builder.value_ty(&value);
        if from.is_int() && to.is_int() && from != *to {
            return self.builder.build_int_cast(value, to.clone(), true, "cast");
        }
        value
    }

    fn lower_string_literal(&mut self, text: &str) -> Value {
        // Private constant byte array, null-terminated for C consumers; the
        // slice length excludes the terminator.
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        let global = self.builder.module().add_global("str", bytes);

        let slice = Value::Undef(Type::slice());
        let slice = self
            .builder
            .build_insert_value(slice, Value::Global(global), 0, "str.ptr");
        self.builder.build_insert_value(
            slice,
            Value::ConstInt {
                ty: Type::Int(64),
                value: text.len() as i64,
            },
            1,
            "str.slice",
        )
    }

    fn lower_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Value, CoreError> {
        let lhs = self.lower_expr(lhs)?;
        let rhs = self.lower_expr(rhs)?;

        let lhs_ty = self.builder.value_ty(&lhs);
        let rhs_ty = self.builder.value_ty(&rhs);
        if !lhs_ty.is_int() || !rhs_ty.is_int() {
            return Err(CoreError::Semantic(format!(
                "operator '{}' requires integer operands",
                op.symbol()
            )));
        }

        // Unify mismatched widths by sign-extending the narrower side.
        let wider = if lhs_ty.int_bits() >= rhs_ty.int_bits() {
            lhs_ty
        } else {
            rhs_ty
        };
        let lhs = self.coerce_int(lhs, &wider);
        let rhs = self.coerce_int(rhs, &wider);

        Ok(match op {
            BinaryOp::Add => self.builder.build_add(lhs, rhs, "addtmp"),
            BinaryOp::Eq => self.builder.build_icmp(IcmpPred::Eq, lhs, rhs, "cmptmp"),
            BinaryOp::Ne => self.builder.build_icmp(IcmpPred::Ne, lhs, rhs, "cmptmp"),
            // Ordering is unsigned by definition here; see the module docs.
            BinaryOp::Lt => self.builder.build_icmp(IcmpPred::Ult, lhs, rhs, "cmptmp"),
            BinaryOp::Le => self.builder.build_icmp(IcmpPred::Ule, lhs, rhs, "cmptmp"),
            BinaryOp::Gt => self.builder.build_icmp(IcmpPred::Ugt, lhs, rhs, "cmptmp"),
            BinaryOp::Ge => self.builder.build_icmp(IcmpPred::Uge, lhs, rhs, "cmptmp"),
        })
    }

    fn lower_call(&mut self, callee: &str, args: &[Expr]) -> Result<Value, CoreError> {
        if matches!(callee, "print" | "println" | "printf") {
            return self.lower_print_call(callee, args);
        }

        let func = self
            .builder
            .module()
            .find_function(callee)
            .ok_or_else(|| CoreError::Semantic(format!("unknown function referenced: {callee}")))?;

        let param_tys: Vec<Type> = self
            .builder
            .module()
            .function(func)
            .params
            .iter()
            .map(|(_, ty)| ty.clone())
            .collect();
        if param_tys.len() != args.len() {
            return Err(CoreError::Semantic(format!(
                "incorrect number of arguments passed to '{callee}'"
            )));
        }

        let mut lowered = Vec::with_capacity(args.len());
        for (arg, param_ty) in args.iter().zip(&param_tys) {
            let value = self.lower_expr(arg)?;
            let value = self.coerce_int(value, param_ty);
            if self.builder.value_ty(&value) != *param_ty {
                return Err(CoreError::Semantic(format!(
                    "argument type mismatch in call to '{callee}'"
                )));
            }
            lowered.push(value);
        }

        Ok(self
            .builder
            .build_call(func, lowered, "calltmp")
            .unwrap_or_else(dummy))
    }

    /// The built-in print family maps onto the C library: `println` calls
    /// `puts`, `print` calls `printf` with a `%s` format. Slice-valued
    /// arguments contribute their data pointer.
    fn lower_print_call(&mut self, callee: &str, args: &[Expr]) -> Result<Value, CoreError> {
        match (callee, args) {
            ("println", [arg]) => {
                let puts = self.declare_libc("puts", false);
                let value = self.lower_expr(arg)?;
                let value = self.slice_data_ptr(value);
                Ok(self
                    .builder
                    .build_call(puts, vec![value], "puts_call")
                    .unwrap_or_else(dummy))
            }
            ("print", [arg]) => {
                let printf = self.declare_libc("printf", true);
                let format = self.builder.module().add_global("print_fmt", b"%s\0".to_vec());
                let value = self.lower_expr(arg)?;
                let value = self.slice_data_ptr(value);
                Ok(self
                    .builder
                    .build_call(printf, vec![Value::Global(format), value], "printf_call")
                    .unwrap_or_else(dummy))
            }
            _ => Err(CoreError::Semantic(
                "complex print formatting not yet implemented".to_string(),
            )),
        }
    }

    fn declare_libc(&mut self, name: &str, variadic: bool) -> FuncId {
        if let Some(func) = self.builder.module().find_function(name) {
            return func;
        }
        let param = if variadic { "fmt" } else { "s" };
        self.cabi.declare_extern_function(
            self.builder.module(),
            name,
            vec![(param.to_string(), Type::Ptr)],
            Type::Int(32),
            variadic,
        )
    }

    fn slice_data_ptr(&mut self, value: Value) -> Value {
        if matches!(self.builder.value_ty(&value), Type::Struct(_)) {
            return self.builder.build_extract_value(value, 0, "str_ptr");
        }
        value
    }

    fn lower_var_decl(
        &mut self,
        name: &str,
        type_name: &str,
        is_const: bool,
        init: Option<&Expr>,
    ) -> Result<Value, CoreError> {
        let ty = lower_type(type_name)?;
        let slot = self.builder.build_alloca(ty.clone(), name);

        let value = match init {
            Some(init) => {
                let value = self.lower_expr(init)?;
                let value = self.coerce_int(value, &ty);
                if self.builder.value_ty(&value) != ty {
                    return Err(CoreError::Semantic(format!(
                        "initializer type mismatch for '{name}'"
                    )));
                }
                value
            }
            None => zero_of(&ty),
        };
        self.builder.build_store(value, slot.clone());

        // Redeclaration simply rebinds; the environment stays function-flat.
        self.env.insert(
            name.to_string(),
            Binding {
                slot: slot.clone(),
                ty,
                is_const,
            },
        );
        Ok(slot)
    }

    fn lower_assign(&mut self, name: &str, value: &Expr) -> Result<Value, CoreError> {
        let binding = self.lookup(name)?;
        if binding.is_const {
            return Err(CoreError::Semantic(format!(
                "cannot assign to constant '{name}'"
            )));
        }

        let value = self.lower_expr(value)?;
        let value = self.coerce_int(value, &binding.ty);
        if self.builder.value_ty(&value) != binding.ty {
            return Err(CoreError::Semantic(format!(
                "assignment type mismatch for '{name}'"
            )));
        }
        self.builder.build_store(value.clone(), binding.slot);
        Ok(value)
    }

    /// Coerces a condition value to i1 by comparing it against zero of its
    /// own type.
    fn coerce_cond(&mut self, cond: Value, name: &str) -> Result<Value, CoreError> {
        let ty = self.builder.value_ty(&cond);
        if !ty.is_int() {
            return Err(CoreError::Semantic(
                "condition must be an integer or boolean".to_string(),
            ));
        }
        Ok(self.builder.build_icmp(
            IcmpPred::Ne,
            cond,
            Value::ConstInt { ty, value: 0 },
            name,
        ))
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_body: &[Expr],
        else_body: &[Expr],
    ) -> Result<Value, CoreError> {
        let cond = self.lower_expr(cond)?;
        let cond = self.coerce_cond(cond, "ifcond")?;

        let then_block = self.builder.append_block("then");
        let else_block = self.builder.append_block("else");
        let merge_block = self.builder.append_block("ifcont");
        self.builder.build_cond_br(cond, then_block, else_block);

        self.builder.position_at_end(then_block);
        self.lower_stmts(then_body)?;
        if !self.builder.has_terminator() {
            self.builder.build_br(merge_block);
        }

        self.builder.position_at_end(else_block);
        self.lower_stmts(else_body)?;
        if !self.builder.has_terminator() {
            self.builder.build_br(merge_block);
        }

        self.builder.position_at_end(merge_block);
        Ok(dummy())
    }

    fn lower_while(&mut self, cond: &Expr, body: &[Expr]) -> Result<Value, CoreError> {
        let cond_block = self.builder.append_block("whilecond");
        let body_block = self.builder.append_block("whileloop");
        let after_block = self.builder.append_block("afterloop");

        self.loops.push(LoopCtx {
            continue_target: cond_block,
            break_target: after_block,
        });

        self.builder.build_br(cond_block);

        self.builder.position_at_end(cond_block);
        let result = self.lower_expr(cond).and_then(|c| {
            let c = self.coerce_cond(c, "whilecond")?;
            self.builder.build_cond_br(c, body_block, after_block);

            self.builder.position_at_end(body_block);
            self.lower_stmts(body)?;
            if !self.builder.has_terminator() {
                self.builder.build_br(cond_block);
            }
            Ok(())
        });
        self.loops.pop();
        result?;

        self.builder.position_at_end(after_block);
        Ok(dummy())
    }

    fn lower_for(
        &mut self,
        var: &str,
        start: &Expr,
        end: &Expr,
        body: &[Expr],
    ) -> Result<Value, CoreError> {
        // Range bounds evaluate once, before the loop variable exists.
        let start = self.lower_expr(start)?;
        let mut end = self.lower_expr(end)?;

        let var_ty = self.builder.value_ty(&start);
        let end_ty = self.builder.value_ty(&end);
        if end_ty != var_ty {
            if var_ty.is_int() && end_ty.is_int() {
                end = self.builder.build_int_cast(end, var_ty.clone(), true, "endcast");
            } else {
                return Err(CoreError::Semantic(
                    "type mismatch in for loop range".to_string(),
                ));
            }
        }

        let slot = self.builder.build_alloca(var_ty.clone(), var);
        self.builder.build_store(start, slot.clone());
        let shadowed = self.env.insert(
            var.to_string(),
            Binding {
                slot: slot.clone(),
                ty: var_ty.clone(),
                is_const: false,
            },
        );

        let cond_block = self.builder.append_block("forcond");
        let body_block = self.builder.append_block("forloop");
        let incr_block = self.builder.append_block("forincr");
        let after_block = self.builder.append_block("afterloop");

        self.loops.push(LoopCtx {
            continue_target: incr_block,
            break_target: after_block,
        });

        self.builder.build_br(cond_block);

        self.builder.position_at_end(cond_block);
        let current = self.builder.build_load(var_ty.clone(), slot.clone(), var);
        // The bound check is signed, unlike the ordering operators.
        let cond = self
            .builder
            .build_icmp(IcmpPred::Slt, current, end, "forcond");
        self.builder.build_cond_br(cond, body_block, after_block);

        self.builder.position_at_end(body_block);
        let result = self.lower_stmts(body);
        if !self.builder.has_terminator() {
            self.builder.build_br(incr_block);
        }

        self.builder.position_at_end(incr_block);
        let current = self.builder.build_load(var_ty.clone(), slot.clone(), var);
        let next = self.builder.build_add(
            current,
            Value::ConstInt {
                ty: var_ty,
                value: 1,
            },
            "nextvar",
        );
        self.builder.build_store(next, slot);
        self.builder.build_br(cond_block);

        self.loops.pop();
        match shadowed {
            Some(binding) => {
                self.env.insert(var.to_string(), binding);
            }
            None => {
                self.env.remove(var);
            }
        }
        result?;

        self.builder.position_at_end(after_block);
        Ok(dummy())
    }
}

/// Statement-position expressions (if, loops, break) yield a placeholder
/// zero; nothing consumes it.
fn dummy() -> Value {
    Value::ConstInt {
        ty: Type::Int(8),
        value: 0,
    }
}

fn zero_of(ty: &Type) -> Value {
    match ty {
        Type::Int(_) => Value::ConstInt {
            ty: ty.clone(),
            value: 0,
        },
        other => Value::Zero(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Inst, Linkage};
    use crate::parser::parse_source;
    use crate::target::Target;

    fn gen(source: &str) -> Result<Module, CoreError> {
        let (functions, _) = parse_source(source)?;
        let cabi = CAbi::new(Target::from_triple("x86_64-unknown-linux-gnu"));
        generate(&functions, &cabi, "test")
    }

    fn gen_ok(source: &str) -> Module {
        gen(source).expect("codegen should succeed")
    }

    #[test]
    fn literal_widths_follow_the_narrowing_table() {
        let rows = [
            (0, 8),
            (255, 8),
            (-1, 8),
            (-128, 8),
            (256, 16),
            (65535, 16),
            (-129, 16),
            (-32768, 16),
            (65536, 32),
            (4294967295, 32),
            (-32769, 32),
            (-2147483648, 32),
            (4294967296, 64),
            (-2147483649, 64),
            (i64::MAX, 64),
            (i64::MIN, 64),
        ];
        for (value, width) in rows {
            assert_eq!(literal_width(value), width, "literal: {value}");
        }
    }

    #[test]
    fn generated_modules_verify() {
        let sources = [
            "fn main() -> u32 { return 0; }",
            "fn add(a: u32, b: u32) -> u32 { return a + b; } fn main() -> u32 { return add(2, 3); }",
            "fn main() -> u32 { for i in 0:3 { println(\"hi\"); } return 0; }",
            "fn main() -> u32 { var i: u32 = 0; while (i < 5) { if (i == 2) { break; } i = i + 1; } return i; }",
            "extern fn puts(s: str) -> i32; fn main() -> u32 { puts(\"ok\"); return 0; }",
            "fn f() { } fn main() -> u32 { f(); return 0; }",
        ];
        for source in sources {
            // `generate` runs module verification before returning.
            gen_ok(source);
        }
    }

    #[test]
    fn every_generated_block_ends_with_its_only_terminator() {
        let module = gen_ok(
            "fn main() -> u32 { \
               var i: u32 = 0; \
               for j in 0:10 { \
                 if (j == 5) { continue; } \
                 while (i < j) { i = i + 1; } \
               } \
               return i; \
             }",
        );
        for function in &module.functions {
            for block in &function.blocks {
                let terminators = block.insts.iter().filter(|i| i.is_terminator()).count();
                assert_eq!(terminators, 1, "block {}", block.name);
                assert!(block.insts.last().expect("non-empty").is_terminator());
            }
        }
    }

    #[test]
    fn linkage_follows_flags_and_main() {
        let module = gen_ok(
            "extern fn puts(s: str) -> i32; \
             export fn api() -> u32 { return 1; } \
             fn helper() -> u32 { return 2; } \
             fn main() -> u32 { return helper(); }",
        );
        let linkage_of = |name: &str| {
            let id = module.find_function(name).expect("function exists");
            module.function(id).linkage
        };
        assert_eq!(linkage_of("puts"), Linkage::External);
        assert_eq!(linkage_of("api"), Linkage::External);
        assert_eq!(linkage_of("helper"), Linkage::Internal);
        assert_eq!(linkage_of("main"), Linkage::External);
    }

    #[test]
    fn break_and_continue_target_the_innermost_loop() {
        let module = gen_ok(
            "fn main() -> u32 { \
               while (1 < 2) { \
                 for i in 0:3 { \
                   if (i == 1) { break; } \
                   continue; \
                 } \
                 break; \
               } \
               return 0; \
             }",
        );
        let function = &module.functions[module.find_function("main").unwrap().0];
        let block_name = |id: &BlockId| function.blocks[id.0].name.as_str();

        let mut saw_inner_break = false;
        let mut saw_inner_continue = false;
        let mut saw_outer_break = false;
        for block in &function.blocks {
            for inst in &block.insts {
                if let Inst::Br(target) = inst {
                    // The while loop claims "afterloop"; the nested for's
                    // after block uniquifies to "afterloop.1".
                    match (block.name.as_str(), block_name(target)) {
                        // break inside the if, within the for body
                        ("then", "afterloop.1") => saw_inner_break = true,
                        // continue in the for body jumps to the increment
                        ("ifcont", "forincr") => saw_inner_continue = true,
                        // break in the while body jumps past the while
                        ("afterloop.1", "afterloop") => saw_outer_break = true,
                        _ => {}
                    }
                }
            }
        }
        assert!(saw_inner_break, "break should branch to the for's after block");
        assert!(saw_inner_continue, "continue should branch to the for's incr block");
        assert!(saw_outer_break, "outer break should branch past the while");
    }

    #[test]
    fn string_literals_become_private_null_terminated_globals() {
        let module = gen_ok("fn main() -> u32 { println(\"hi\"); return 0; }");
        let global = &module.globals[0];
        assert_eq!(global.bytes, b"hi\0");
        assert_eq!(global.linkage, Linkage::Private);
        assert!(global.is_const);

        let text = module.to_string();
        assert!(text.contains("call i32 @puts"), "text: {text}");
        assert!(text.contains("extractvalue { ptr, i64 }"), "text: {text}");
    }

    #[test]
    fn print_goes_through_printf_with_a_format_global() {
        let module = gen_ok("fn main() -> u32 { print(\"x\"); return 0; }");
        assert!(module
            .globals
            .iter()
            .any(|g| g.name.starts_with("print_fmt") && g.bytes == b"%s\0"));
        let text = module.to_string();
        assert!(text.contains("call i32 (ptr, ...) @printf"), "text: {text}");
    }

    #[test]
    fn printf_builtin_rejects_unsupported_forms() {
        for source in [
            "fn main() { printf(\"%d\", 1); }",
            "fn main() { println(\"a\", \"b\"); }",
            "fn main() { print(); }",
        ] {
            let err = gen(source).unwrap_err();
            assert!(
                matches!(err, CoreError::Semantic(ref m) if m.contains("not yet implemented")),
                "source: {source}"
            );
        }
    }

    #[test]
    fn unknown_names_are_semantic_errors() {
        let err = gen("fn main() -> u32 { return x; }").unwrap_err();
        assert!(matches!(err, CoreError::Semantic(ref m) if m.contains("unknown variable")));

        let err = gen("fn main() -> u32 { return f(); }").unwrap_err();
        assert!(matches!(err, CoreError::Semantic(ref m) if m.contains("unknown function")));

        let err = gen("fn f(a: u8) -> u8 { return a; } fn main() -> u32 { return f(1, 2); }")
            .unwrap_err();
        assert!(matches!(err, CoreError::Semantic(ref m) if m.contains("number of arguments")));
    }

    #[test]
    fn functions_must_be_declared_before_use() {
        let err = gen("fn main() -> u32 { return late(); } fn late() -> u32 { return 1; }")
            .unwrap_err();
        assert!(matches!(err, CoreError::Semantic(ref m) if m.contains("unknown function")));
    }

    #[test]
    fn break_outside_a_loop_is_rejected() {
        let err = gen("fn main() { break; }").unwrap_err();
        assert!(
            matches!(err, CoreError::Semantic(ref m) if m.contains("break statement not inside a loop"))
        );

        let err = gen("fn main() { continue; }").unwrap_err();
        assert!(
            matches!(err, CoreError::Semantic(ref m) if m.contains("continue statement not inside a loop"))
        );
    }

    #[test]
    fn const_bindings_reject_assignment() {
        let err = gen("fn main() -> u32 { const c: u32 = 1; c = 2; return c; }").unwrap_err();
        assert!(matches!(err, CoreError::Semantic(ref m) if m.contains("constant")));

        // var bindings accept it.
        gen_ok("fn main() -> u32 { var v: u32 = 1; v = 2; return v; }");
    }

    #[test]
    fn mismatched_for_range_operands_are_rejected() {
        let err = gen("fn main() { for i in \"a\":3 { } }").unwrap_err();
        assert!(matches!(err, CoreError::Semantic(ref m) if m.contains("for loop range")));

        // Differing integer widths are reconciled with a cast instead.
        let module = gen_ok("fn main() -> u32 { for i in 0:65536 { } return 0; }");
        let text = module.to_string();
        assert!(text.contains("icmp slt"), "text: {text}");
    }

    #[test]
    fn ordering_comparisons_are_unsigned_but_for_bound_is_signed() {
        let module = gen_ok(
            "fn main() -> u32 { \
               var a: u32 = 1; \
               if (a < 2) { } \
               for i in 0:3 { } \
               return 0; \
             }",
        );
        let text = module.to_string();
        assert!(text.contains("icmp ult"), "text: {text}");
        assert!(text.contains("icmp slt"), "text: {text}");
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(lower_type("u64").is_err());
        assert!(lower_type("[]nope").is_err());
        assert_eq!(lower_type("[][]u8").unwrap(), Type::slice());
        assert_eq!(lower_type("bool").unwrap(), Type::Int(1));
    }

    #[test]
    fn implicit_void_return_is_emitted() {
        let module = gen_ok("fn side() { } fn main() -> u32 { side(); return 0; }");
        let side = &module.functions[module.find_function("side").unwrap().0];
        assert!(matches!(
            side.blocks[0].insts.last(),
            Some(Inst::Ret(None))
        ));
    }

    #[test]
    fn missing_return_in_typed_function_fails_verification() {
        let err = gen("fn f() -> u32 { }").unwrap_err();
        assert!(matches!(err, CoreError::Backend(_)));
    }

    #[test]
    fn statements_after_a_terminator_are_not_lowered() {
        // Anything after the first return is unreachable and skipped; the
        // module still verifies.
        let module = gen_ok("fn main() -> u32 { return 1; return 2; }");
        let main = &module.functions[module.find_function("main").unwrap().0];
        let rets = main.blocks[0]
            .insts
            .iter()
            .filter(|i| matches!(i, Inst::Ret(_)))
            .count();
        assert_eq!(rets, 1);
    }

    #[test]
    fn call_arguments_are_coerced_to_parameter_widths() {
        let module = gen_ok(
            "fn add(a: u32, b: u32) -> u32 { return a + b; } \
             fn main() -> u32 { return add(2, 3); }",
        );
        let text = module.to_string();
        // The i8 literals fold through the widening cast to i32 constants.
        assert!(text.contains("call i32 @add(i32 2, i32 3)"), "text: {text}");

        // A non-constant narrow argument widens with an explicit sext.
        let module = gen_ok(
            "fn take(x: u32) -> u32 { return x; } \
             fn main() -> u32 { var n: u8 = 7; return take(n); }",
        );
        let text = module.to_string();
        assert!(text.contains("sext i8"), "text: {text}");
    }
}
