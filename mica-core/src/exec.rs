//! Run-mode execution of a verified module.
//!
//! Plays the role a JIT plays behind a compile-and-go driver: locate `main`,
//! call it with no arguments, and hand back its integer result. Evaluation
//! walks the IR directly; integer operations wrap at their operand width and
//! comparisons honor their signed/unsigned predicate. The C library
//! functions the code generator leans on (`puts`, `printf`) are intercepted
//! natively and write to a caller-supplied sink, so tests can capture
//! program output.

use std::io::Write;

use crate::error::CoreError;
use crate::ir::{CastOp, FuncId, Function, GlobalId, IcmpPred, Inst, Module, Type, Value};

/// Recursion guard; deep call chains fail cleanly instead of exhausting the
/// host stack.
const MAX_CALL_DEPTH: usize = 512;

/// Runtime values are integers, pointers into module data or frame slots,
/// and flat aggregates (slices).
#[derive(Debug, Clone)]
enum RtValue {
    Int { bits: u32, value: i64 },
    Ptr(RtPtr),
    Agg(Vec<RtValue>),
    Undef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RtPtr {
    Global(GlobalId),
    Slot(usize),
    Null,
}

impl RtValue {
    fn as_int(&self) -> Result<(u32, i64), CoreError> {
        match self {
            RtValue::Int { bits, value } => Ok((*bits, *value)),
            other => Err(CoreError::Backend(format!(
                "expected an integer value, found {other:?}"
            ))),
        }
    }

    fn as_ptr(&self) -> Result<RtPtr, CoreError> {
        match self {
            RtValue::Ptr(ptr) => Ok(*ptr),
            other => Err(CoreError::Backend(format!(
                "expected a pointer value, found {other:?}"
            ))),
        }
    }
}

/// Sign-extends `value` from `bits` so arithmetic results stay canonical.
fn canonical(bits: u32, value: i64) -> i64 {
    if bits >= 64 {
        value
    } else {
        let shift = 64 - bits;
        (value << shift) >> shift
    }
}

/// The `bits`-wide unsigned reading of `value`.
fn zext(bits: u32, value: i64) -> u64 {
    if bits >= 64 {
        value as u64
    } else {
        (value as u64) & ((1u64 << bits) - 1)
    }
}

fn zero_of(ty: &Type) -> RtValue {
    match ty {
        Type::Int(bits) => RtValue::Int {
            bits: *bits,
            value: 0,
        },
        Type::Ptr => RtValue::Ptr(RtPtr::Null),
        Type::Struct(fields) => RtValue::Agg(fields.iter().map(zero_of).collect()),
        _ => RtValue::Undef,
    }
}

struct Frame {
    args: Vec<RtValue>,
    values: Vec<Option<RtValue>>,
    slots: Vec<RtValue>,
}

pub struct Engine<'m, W: Write> {
    module: &'m Module,
    out: W,
    depth: usize,
}

impl<'m, W: Write> Engine<'m, W> {
    pub fn new(module: &'m Module, out: W) -> Engine<'m, W> {
        Engine {
            module,
            out,
            depth: 0,
        }
    }

    /// Finds `main` and invokes it with no arguments. Returns the unsigned
    /// reading of its integer result, or `None` for a void `main`.
    pub fn run_main(&mut self) -> Result<Option<i64>, CoreError> {
        let main = self
            .module
            .find_function("main")
            .ok_or_else(|| CoreError::Backend("no main function found".to_string()))?;
        if !self.module.function(main).params.is_empty() {
            return Err(CoreError::Backend(
                "main must take no arguments".to_string(),
            ));
        }

        match self.call(main, Vec::new())? {
            None => Ok(None),
            Some(RtValue::Int { bits, value }) => Ok(Some(zext(bits, value) as i64)),
            Some(other) => Err(CoreError::Backend(format!(
                "main returned a non-integer value: {other:?}"
            ))),
        }
    }

    fn call(&mut self, func: FuncId, args: Vec<RtValue>) -> Result<Option<RtValue>, CoreError> {
        let module = self.module;
        let function = module.function(func);

        if function.is_declaration() {
            return self.call_native(function, args);
        }

        self.depth += 1;
        if self.depth > MAX_CALL_DEPTH {
            self.depth -= 1;
            return Err(CoreError::Backend(format!(
                "call depth exceeded {MAX_CALL_DEPTH} in '{}'",
                function.name
            )));
        }
        let result = self.run_body(function, args);
        self.depth -= 1;
        result
    }

    fn run_body(
        &mut self,
        function: &Function,
        args: Vec<RtValue>,
    ) -> Result<Option<RtValue>, CoreError> {
        let mut frame = Frame {
            args,
            values: vec![None; function.values.len()],
            slots: Vec::new(),
        };
        let mut block = 0usize;

        'blocks: loop {
            for inst in &function.blocks[block].insts {
                match inst {
                    Inst::Alloca { dest, ty } => {
                        frame.slots.push(zero_of(ty));
                        frame.values[dest.0] =
                            Some(RtValue::Ptr(RtPtr::Slot(frame.slots.len() - 1)));
                    }
                    Inst::Load { dest, ptr, .. } => {
                        let loaded = match self.eval(&frame, function, ptr)?.as_ptr()? {
                            RtPtr::Slot(index) => frame.slots[index].clone(),
                            RtPtr::Global(_) | RtPtr::Null => {
                                return Err(CoreError::Backend(
                                    "load from a non-slot pointer".to_string(),
                                ));
                            }
                        };
                        frame.values[dest.0] = Some(loaded);
                    }
                    Inst::Store { value, ptr } => {
                        let value = self.eval(&frame, function, value)?;
                        match self.eval(&frame, function, ptr)?.as_ptr()? {
                            RtPtr::Slot(index) => frame.slots[index] = value,
                            RtPtr::Global(_) | RtPtr::Null => {
                                return Err(CoreError::Backend(
                                    "store to a non-slot pointer".to_string(),
                                ));
                            }
                        }
                    }
                    Inst::Add { dest, lhs, rhs } => {
                        let (bits, lhs) = self.eval(&frame, function, lhs)?.as_int()?;
                        let (_, rhs) = self.eval(&frame, function, rhs)?.as_int()?;
                        frame.values[dest.0] = Some(RtValue::Int {
                            bits,
                            value: canonical(bits, lhs.wrapping_add(rhs)),
                        });
                    }
                    Inst::ICmp {
                        dest,
                        pred,
                        lhs,
                        rhs,
                    } => {
                        let (bits, lhs) = self.eval(&frame, function, lhs)?.as_int()?;
                        let (_, rhs) = self.eval(&frame, function, rhs)?.as_int()?;
                        let result = match pred {
                            IcmpPred::Eq => zext(bits, lhs) == zext(bits, rhs),
                            IcmpPred::Ne => zext(bits, lhs) != zext(bits, rhs),
                            IcmpPred::Ult => zext(bits, lhs) < zext(bits, rhs),
                            IcmpPred::Ule => zext(bits, lhs) <= zext(bits, rhs),
                            IcmpPred::Ugt => zext(bits, lhs) > zext(bits, rhs),
                            IcmpPred::Uge => zext(bits, lhs) >= zext(bits, rhs),
                            IcmpPred::Slt => canonical(bits, lhs) < canonical(bits, rhs),
                        };
                        frame.values[dest.0] = Some(RtValue::Int {
                            bits: 1,
                            value: i64::from(result),
                        });
                    }
                    Inst::Cast {
                        dest,
                        op,
                        value,
                        to,
                    } => {
                        let (bits, value) = self.eval(&frame, function, value)?.as_int()?;
                        let to_bits = to.int_bits().unwrap_or(64);
                        let value = match op {
                            CastOp::Sext => canonical(bits, value),
                            CastOp::Zext => zext(bits, value) as i64,
                            CastOp::Trunc => canonical(to_bits, value),
                        };
                        frame.values[dest.0] = Some(RtValue::Int {
                            bits: to_bits,
                            value: canonical(to_bits, value),
                        });
                    }
                    Inst::ExtractValue { dest, agg, index } => {
                        let agg = self.eval(&frame, function, agg)?;
                        let RtValue::Agg(fields) = agg else {
                            return Err(CoreError::Backend(
                                "extractvalue on a non-aggregate".to_string(),
                            ));
                        };
                        frame.values[dest.0] = Some(fields[*index].clone());
                    }
                    Inst::InsertValue {
                        dest,
                        agg,
                        value,
                        index,
                    } => {
                        let mut fields = match self.eval(&frame, function, agg)? {
                            RtValue::Agg(fields) => fields,
                            RtValue::Undef => {
                                let Type::Struct(tys) = function.value_ty(agg) else {
                                    return Err(CoreError::Backend(
                                        "insertvalue on a non-aggregate".to_string(),
                                    ));
                                };
                                tys.iter().map(|_| RtValue::Undef).collect()
                            }
                            _ => {
                                return Err(CoreError::Backend(
                                    "insertvalue on a non-aggregate".to_string(),
                                ));
                            }
                        };
                        fields[*index] = self.eval(&frame, function, value)?;
                        frame.values[dest.0] = Some(RtValue::Agg(fields));
                    }
                    Inst::Call { dest, callee, args } => {
                        let mut lowered = Vec::with_capacity(args.len());
                        for arg in args {
                            lowered.push(self.eval(&frame, function, arg)?);
                        }
                        let result = self.call(*callee, lowered)?;
                        if let Some(dest) = dest {
                            frame.values[dest.0] = Some(result.ok_or_else(|| {
                                CoreError::Backend("void call used as a value".to_string())
                            })?);
                        }
                    }
                    Inst::Ret(value) => {
                        return match value {
                            Some(value) => Ok(Some(self.eval(&frame, function, value)?)),
                            None => Ok(None),
                        };
                    }
                    Inst::Br(target) => {
                        block = target.0;
                        continue 'blocks;
                    }
                    Inst::CondBr {
                        cond,
                        then_dest,
                        else_dest,
                    } => {
                        let (_, value) = self.eval(&frame, function, cond)?.as_int()?;
                        block = if value != 0 { then_dest.0 } else { else_dest.0 };
                        continue 'blocks;
                    }
                }
            }
            return Err(CoreError::Backend(format!(
                "block '{}' fell through without a terminator",
                function.blocks[block].name
            )));
        }
    }

    fn eval(&self, frame: &Frame, function: &Function, value: &Value) -> Result<RtValue, CoreError> {
        match value {
            Value::ConstInt { ty, value } => Ok(RtValue::Int {
                bits: ty.int_bits().unwrap_or(64),
                value: *value,
            }),
            Value::Global(id) => Ok(RtValue::Ptr(RtPtr::Global(*id))),
            Value::Param(index) => Ok(frame.args[*index].clone()),
            Value::Inst(id) => frame.values[id.0]
                .clone()
                .ok_or_else(|| CoreError::Backend("use of an undefined value".to_string())),
            Value::Undef(_) => Ok(RtValue::Undef),
            Value::Zero(ty) => Ok(zero_of(ty)),
        }
    }

    /// C library interception for declarations the code generator (or an
    /// extern declaration in source) introduced.
    fn call_native(
        &mut self,
        function: &Function,
        args: Vec<RtValue>,
    ) -> Result<Option<RtValue>, CoreError> {
        match function.name.as_str() {
            "puts" => {
                let text = self.c_string(args.first().ok_or_else(|| {
                    CoreError::Backend("puts called without an argument".to_string())
                })?)?;
                self.out
                    .write_all(&text)
                    .and_then(|_| self.out.write_all(b"\n"))
                    .map_err(|e| CoreError::Backend(format!("output sink failed: {e}")))?;
                Ok(Some(RtValue::Int { bits: 32, value: 0 }))
            }
            "printf" => {
                let written = self.native_printf(&args)?;
                Ok(Some(RtValue::Int {
                    bits: 32,
                    value: written,
                }))
            }
            other => Err(CoreError::Backend(format!(
                "unresolved external function: {other}"
            ))),
        }
    }

    /// Reads the NUL-terminated bytes a `ptr`-or-slice argument points at.
    fn c_string(&self, value: &RtValue) -> Result<Vec<u8>, CoreError> {
        let ptr = match value {
            RtValue::Agg(fields) => fields
                .first()
                .ok_or_else(|| CoreError::Backend("empty aggregate".to_string()))?
                .as_ptr()?,
            other => other.as_ptr()?,
        };
        match ptr {
            RtPtr::Global(id) => {
                let bytes = &self.module.global(id).bytes;
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Ok(bytes[..end].to_vec())
            }
            RtPtr::Slot(_) | RtPtr::Null => Err(CoreError::Backend(
                "string argument does not point at constant data".to_string(),
            )),
        }
    }

    fn native_printf(&mut self, args: &[RtValue]) -> Result<i64, CoreError> {
        let format = self.c_string(args.first().ok_or_else(|| {
            CoreError::Backend("printf called without a format string".to_string())
        })?)?;

        let mut output = Vec::new();
        let mut next_arg = 1usize;
        let mut bytes = format.iter().copied().peekable();
        while let Some(byte) = bytes.next() {
            if byte != b'%' {
                output.push(byte);
                continue;
            }
            match bytes.next() {
                Some(b'%') => output.push(b'%'),
                Some(b's') => {
                    let arg = args.get(next_arg).ok_or_else(|| {
                        CoreError::Backend("printf: missing %s argument".to_string())
                    })?;
                    next_arg += 1;
                    output.extend_from_slice(&self.c_string(arg)?);
                }
                Some(b'd') | Some(b'u') => {
                    let arg = args.get(next_arg).ok_or_else(|| {
                        CoreError::Backend("printf: missing integer argument".to_string())
                    })?;
                    next_arg += 1;
                    let (bits, value) = arg.as_int()?;
                    output.extend_from_slice(canonical(bits, value).to_string().as_bytes());
                }
                Some(other) => {
                    output.push(b'%');
                    output.push(other);
                }
                None => output.push(b'%'),
            }
        }

        self.out
            .write_all(&output)
            .map_err(|e| CoreError::Backend(format!("output sink failed: {e}")))?;
        Ok(output.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cabi::CAbi;
    use crate::codegen::generate;
    use crate::parser::parse_source;
    use crate::target::Target;

    fn run(source: &str) -> Result<(Option<i64>, String), CoreError> {
        let (functions, _) = parse_source(source)?;
        let cabi = CAbi::new(Target::from_triple("x86_64-unknown-linux-gnu"));
        let module = generate(&functions, &cabi, "test")?;
        let mut out = Vec::new();
        let result = Engine::new(&module, &mut out).run_main()?;
        Ok((result, String::from_utf8_lossy(&out).into_owned()))
    }

    #[test]
    fn returns_main_exit_value() {
        let (result, _) = run("fn main() -> u32 { return 0; }").expect("run");
        assert_eq!(result, Some(0));
    }

    #[test]
    fn calls_user_functions() {
        let (result, _) = run(
            "fn add(a: u32, b: u32) -> u32 { return a + b; } \
             fn main() -> u32 { return add(2, 3); }",
        )
        .expect("run");
        assert_eq!(result, Some(5));
    }

    #[test]
    fn for_loop_prints_each_iteration() {
        let (result, output) = run(
            "fn main() -> u32 { for i in 0:3 { println(\"hi\"); } return 0; }",
        )
        .expect("run");
        assert_eq!(result, Some(0));
        assert_eq!(output, "hi\nhi\nhi\n");
    }

    #[test]
    fn while_with_break_stops_at_two() {
        let (result, _) = run(
            "fn main() -> u32 { \
               var i: u32 = 0; \
               while (i < 5) { if (i == 2) { break; } i = i + 1; } \
               return i; \
             }",
        )
        .expect("run");
        assert_eq!(result, Some(2));
    }

    #[test]
    fn continue_skips_to_the_next_iteration() {
        let (_, output) = run(
            "fn main() -> u32 { \
               for i in 0:4 { if (i == 1) { continue; } print(\"x\"); } \
               return 0; \
             }",
        )
        .expect("run");
        assert_eq!(output, "xxx");
    }

    #[test]
    fn extern_puts_is_intercepted() {
        let (result, output) = run(
            "extern fn puts(s: str) -> i32; \
             fn main() -> u32 { puts(\"ok\"); return 0; }",
        )
        .expect("run");
        assert_eq!(result, Some(0));
        assert_eq!(output, "ok\n");
    }

    #[test]
    fn void_main_reports_no_exit_value() {
        let (result, _) = run("fn main() { }").expect("run");
        assert_eq!(result, None);
    }

    #[test]
    fn arithmetic_wraps_at_operand_width() {
        let (result, _) = run(
            "fn main() -> u32 { \
               var x: u8 = 255; \
               x = x + 1; \
               return x; \
             }",
        )
        .expect("run");
        // u8 wrap-around, then zero-extended into the u32 return.
        assert_eq!(result, Some(0));
    }

    #[test]
    fn unsigned_comparison_treats_negative_bits_as_large() {
        let (result, _) = run(
            "fn main() -> u32 { \
               var x: u8 = -1; \
               if (x < 1) { return 10; } \
               return 20; \
             }",
        )
        .expect("run");
        // 0xFF compares unsigned as 255, so the branch is not taken.
        assert_eq!(result, Some(20));
    }

    #[test]
    fn recursion_works_and_runaway_recursion_is_bounded() {
        let (result, _) = run(
            "fn fib(n: u32) -> u32 { \
               if (n < 2) { return n; } \
               return fib(n + -1) + fib(n + -2); \
             } \
             fn main() -> u32 { return fib(10); }",
        )
        .expect("run");
        assert_eq!(result, Some(55));

        let err = run("fn spin() -> u32 { return spin(); } fn main() -> u32 { return spin(); }")
            .unwrap_err();
        assert!(matches!(err, CoreError::Backend(ref m) if m.contains("call depth")));
    }

    #[test]
    fn missing_main_is_a_backend_error() {
        let err = run("fn helper() -> u32 { return 1; }").unwrap_err();
        assert!(matches!(err, CoreError::Backend(ref m) if m.contains("no main function")));
    }

    #[test]
    fn unresolved_externs_fail_at_call_time() {
        let err = run(
            "extern fn mystery() -> i32; \
             fn main() -> u32 { mystery(); return 0; }",
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Backend(ref m) if m.contains("unresolved external")));
    }

    #[test]
    fn nested_loops_and_shadowed_for_variable() {
        let (result, _) = run(
            "fn main() -> u32 { \
               var i: u32 = 100; \
               var total: u32 = 0; \
               for i in 0:3 { \
                 for j in 0:2 { total = total + 1; } \
               } \
               return total + i; \
             }",
        )
        .expect("run");
        // 3 * 2 iterations, plus the outer i restored to 100 afterwards.
        assert_eq!(result, Some(106));
    }
}
