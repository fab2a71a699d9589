//! Typed, block-structured intermediate representation.
//!
//! The code generator lowers the AST into a [`Module`]: ordered byte-array
//! globals plus ordered functions, each function a list of labelled blocks
//! holding instructions in SSA form. The module offers three services:
//!
//! * a [`FunctionBuilder`] bound to a current insertion block, so lowering
//!   can ask `has_terminator()` before emitting branches;
//! * a structural verifier (`Module::verify`) that rejects malformed bodies
//!   before anything downstream sees them;
//! * a textual printer (`fmt::Display`) that renders the module following
//!   LLVM assembly conventions (`define`/`declare`, `%name` values, opaque
//!   `ptr`, `c"..."` byte-array globals).
//!
//! Pointers are opaque: loads and stores carry their own value types, the
//! way a modern LLVM module would spell them.

use std::collections::HashMap;
use std::fmt;

use crate::target::CallConv;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Void,
    /// Integer of the given bit width (1, 8, 16, 32 or 64).
    Int(u32),
    /// Opaque pointer.
    Ptr,
    Struct(Vec<Type>),
    /// Fixed-size array, used for string data globals.
    Array(u64, Box<Type>),
}

impl Type {
    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn int_bits(&self) -> Option<u32> {
        match self {
            Type::Int(bits) => Some(*bits),
            _ => None,
        }
    }

    /// The `{ ptr, i64 }` aggregate used for `str` and slice values.
    pub fn slice() -> Type {
        Type::Struct(vec![Type::Ptr, Type::Int(64)])
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Ptr => write!(f, "ptr"),
            Type::Struct(fields) => {
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, " }}")
            }
            Type::Array(len, elem) => write!(f, "[{len} x {elem}]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub usize);

/// Operand of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    ConstInt { ty: Type, value: i64 },
    /// Address of a module global.
    Global(GlobalId),
    /// Parameter of the enclosing function.
    Param(usize),
    /// Result of a prior instruction.
    Inst(ValueId),
    Undef(Type),
    Zero(Type),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpPred {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
}

impl IcmpPred {
    fn token(self) -> &'static str {
        match self {
            IcmpPred::Eq => "eq",
            IcmpPred::Ne => "ne",
            IcmpPred::Ult => "ult",
            IcmpPred::Ule => "ule",
            IcmpPred::Ugt => "ugt",
            IcmpPred::Uge => "uge",
            IcmpPred::Slt => "slt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    Sext,
    Zext,
    Trunc,
}

impl CastOp {
    fn token(self) -> &'static str {
        match self {
            CastOp::Sext => "sext",
            CastOp::Zext => "zext",
            CastOp::Trunc => "trunc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Alloca {
        dest: ValueId,
        ty: Type,
    },
    Load {
        dest: ValueId,
        ty: Type,
        ptr: Value,
    },
    Store {
        value: Value,
        ptr: Value,
    },
    Add {
        dest: ValueId,
        lhs: Value,
        rhs: Value,
    },
    ICmp {
        dest: ValueId,
        pred: IcmpPred,
        lhs: Value,
        rhs: Value,
    },
    Cast {
        dest: ValueId,
        op: CastOp,
        value: Value,
        to: Type,
    },
    ExtractValue {
        dest: ValueId,
        agg: Value,
        index: usize,
    },
    InsertValue {
        dest: ValueId,
        agg: Value,
        value: Value,
        index: usize,
    },
    Call {
        dest: Option<ValueId>,
        callee: FuncId,
        args: Vec<Value>,
    },
    Ret(Option<Value>),
    Br(BlockId),
    CondBr {
        cond: Value,
        then_dest: BlockId,
        else_dest: BlockId,
    },
}

impl Inst {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Inst::Ret(_) | Inst::Br(_) | Inst::CondBr { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub insts: Vec<Inst>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    External,
    Internal,
    Private,
}

impl Linkage {
    fn token(self) -> &'static str {
        match self {
            Linkage::External => "",
            Linkage::Internal => "internal ",
            Linkage::Private => "private ",
        }
    }
}

/// Name and type of an instruction result.
#[derive(Debug, Clone)]
pub struct ValueInfo {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<(String, Type)>,
    pub ret: Type,
    pub linkage: Linkage,
    pub callconv: CallConv,
    pub is_variadic: bool,
    /// Empty for declarations.
    pub blocks: Vec<Block>,
    pub values: Vec<ValueInfo>,
    name_counts: HashMap<String, usize>,
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The type an operand carries inside this function.
    pub fn value_ty(&self, value: &Value) -> Type {
        match value {
            Value::ConstInt { ty, .. } => ty.clone(),
            Value::Global(_) => Type::Ptr,
            Value::Param(index) => self.params[*index].1.clone(),
            Value::Inst(id) => self.values[id.0].ty.clone(),
            Value::Undef(ty) | Value::Zero(ty) => ty.clone(),
        }
    }

    fn unique_name(&mut self, hint: &str) -> String {
        let hint = if hint.is_empty() { "tmp" } else { hint };
        let count = self.name_counts.entry(hint.to_string()).or_insert(0);
        let name = if *count == 0 {
            hint.to_string()
        } else {
            format!("{hint}.{count}")
        };
        *count += 1;
        name
    }
}

#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub bytes: Vec<u8>,
    pub linkage: Linkage,
    pub is_const: bool,
}

impl Global {
    pub fn ty(&self) -> Type {
        Type::Array(self.bytes.len() as u64, Box::new(Type::Int(8)))
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub triple: String,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>, triple: impl Into<String>) -> Module {
        Module {
            name: name.into(),
            triple: triple.into(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Adds a private constant byte-array global, uniquifying `name_hint`.
    pub fn add_global(&mut self, name_hint: &str, bytes: Vec<u8>) -> GlobalId {
        let mut name = name_hint.to_string();
        let mut suffix = 0usize;
        while self.globals.iter().any(|g| g.name == name) {
            suffix += 1;
            name = format!("{name_hint}.{suffix}");
        }
        self.globals.push(Global {
            name,
            bytes,
            linkage: Linkage::Private,
            is_const: true,
        });
        GlobalId(self.globals.len() - 1)
    }

    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<(String, Type)>,
        ret: Type,
        linkage: Linkage,
        callconv: CallConv,
        is_variadic: bool,
    ) -> FuncId {
        self.functions.push(Function {
            name: name.into(),
            params,
            ret,
            linkage,
            callconv,
            is_variadic,
            blocks: Vec::new(),
            values: Vec::new(),
            name_counts: HashMap::new(),
        });
        FuncId(self.functions.len() - 1)
    }

    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(FuncId)
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0]
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.0]
    }

    /// Structural verification of every function body. The first violation
    /// is returned as a message naming the function and block.
    pub fn verify(&self) -> Result<(), String> {
        for function in &self.functions {
            self.verify_function(function)?;
        }
        Ok(())
    }

    fn verify_function(&self, function: &Function) -> Result<(), String> {
        if function.is_declaration() {
            return Ok(());
        }

        for block in &function.blocks {
            let at = |detail: &str| {
                format!(
                    "function '{}', block '{}': {}",
                    function.name, block.name, detail
                )
            };

            let Some(last) = block.insts.last() else {
                return Err(at("block is empty"));
            };
            if !last.is_terminator() {
                return Err(at("block does not end with a terminator"));
            }
            for inst in &block.insts[..block.insts.len() - 1] {
                if inst.is_terminator() {
                    return Err(at("terminator in the middle of a block"));
                }
            }

            for inst in &block.insts {
                self.verify_inst(function, inst)
                    .map_err(|detail| at(&detail))?;
            }
        }

        Ok(())
    }

    fn verify_inst(&self, function: &Function, inst: &Inst) -> Result<(), String> {
        let check_operand = |value: &Value| -> Result<(), String> {
            match value {
                Value::Param(index) if *index >= function.params.len() => {
                    Err(format!("parameter index {index} out of range"))
                }
                Value::Inst(id) if id.0 >= function.values.len() => {
                    Err(format!("value id {} out of range", id.0))
                }
                Value::Global(id) if id.0 >= self.globals.len() => {
                    Err(format!("global id {} out of range", id.0))
                }
                _ => Ok(()),
            }
        };
        let check_target = |block: BlockId| -> Result<(), String> {
            if block.0 >= function.blocks.len() {
                return Err(format!("branch target {} out of range", block.0));
            }
            Ok(())
        };

        match inst {
            Inst::Alloca { .. } => Ok(()),
            Inst::Load { ptr, .. } => {
                check_operand(ptr)?;
                if function.value_ty(ptr) != Type::Ptr {
                    return Err("load address is not a pointer".to_string());
                }
                Ok(())
            }
            Inst::Store { value, ptr } => {
                check_operand(value)?;
                check_operand(ptr)?;
                if function.value_ty(ptr) != Type::Ptr {
                    return Err("store address is not a pointer".to_string());
                }
                Ok(())
            }
            Inst::Add { dest, lhs, rhs } => {
                check_operand(lhs)?;
                check_operand(rhs)?;
                let lt = function.value_ty(lhs);
                let rt = function.value_ty(rhs);
                if !lt.is_int() || lt != rt {
                    return Err(format!("add operand types differ: {lt} vs {rt}"));
                }
                if function.values[dest.0].ty != lt {
                    return Err("add result type differs from operands".to_string());
                }
                Ok(())
            }
            Inst::ICmp { dest, lhs, rhs, .. } => {
                check_operand(lhs)?;
                check_operand(rhs)?;
                let lt = function.value_ty(lhs);
                let rt = function.value_ty(rhs);
                if !lt.is_int() || lt != rt {
                    return Err(format!("icmp operand types differ: {lt} vs {rt}"));
                }
                if function.values[dest.0].ty != Type::Int(1) {
                    return Err("icmp result is not i1".to_string());
                }
                Ok(())
            }
            Inst::Cast { dest, value, to, .. } => {
                check_operand(value)?;
                if !function.value_ty(value).is_int() || !to.is_int() {
                    return Err("integer cast on non-integer operand".to_string());
                }
                if function.values[dest.0].ty != *to {
                    return Err("cast result type mismatch".to_string());
                }
                Ok(())
            }
            Inst::ExtractValue { dest, agg, index } => {
                check_operand(agg)?;
                let Type::Struct(fields) = function.value_ty(agg) else {
                    return Err("extractvalue on a non-aggregate".to_string());
                };
                let Some(field) = fields.get(*index) else {
                    return Err(format!("extractvalue index {index} out of range"));
                };
                if function.values[dest.0].ty != *field {
                    return Err("extractvalue result type mismatch".to_string());
                }
                Ok(())
            }
            Inst::InsertValue {
                dest,
                agg,
                value,
                index,
            } => {
                check_operand(agg)?;
                check_operand(value)?;
                let agg_ty = function.value_ty(agg);
                let Type::Struct(fields) = &agg_ty else {
                    return Err("insertvalue on a non-aggregate".to_string());
                };
                let Some(field) = fields.get(*index) else {
                    return Err(format!("insertvalue index {index} out of range"));
                };
                if function.value_ty(value) != *field {
                    return Err("insertvalue operand type mismatch".to_string());
                }
                if function.values[dest.0].ty != agg_ty {
                    return Err("insertvalue result type mismatch".to_string());
                }
                Ok(())
            }
            Inst::Call { dest, callee, args } => {
                let Some(callee) = self.functions.get(callee.0) else {
                    return Err("call to unknown function".to_string());
                };
                let fixed = callee.params.len();
                if args.len() < fixed || (!callee.is_variadic && args.len() != fixed) {
                    return Err(format!(
                        "call to '{}' passes {} arguments, expected {}",
                        callee.name,
                        args.len(),
                        fixed
                    ));
                }
                for (arg, (_, param_ty)) in args.iter().zip(&callee.params) {
                    check_operand(arg)?;
                    let arg_ty = function.value_ty(arg);
                    if arg_ty != *param_ty {
                        return Err(format!(
                            "call to '{}': argument type {arg_ty} does not match parameter type {param_ty}",
                            callee.name
                        ));
                    }
                }
                for arg in args.iter().skip(fixed) {
                    check_operand(arg)?;
                }
                match dest {
                    Some(id) => {
                        if function.values[id.0].ty != callee.ret {
                            return Err("call result type mismatch".to_string());
                        }
                    }
                    None => {
                        if callee.ret != Type::Void {
                            // Discarding a non-void result is allowed; the
                            // builder only omits the destination for void.
                            return Err("non-void call without a result".to_string());
                        }
                    }
                }
                Ok(())
            }
            Inst::Ret(value) => match value {
                Some(value) => {
                    check_operand(value)?;
                    let ty = function.value_ty(value);
                    if ty != function.ret {
                        return Err(format!(
                            "return of {ty} from a function returning {}",
                            function.ret
                        ));
                    }
                    Ok(())
                }
                None => {
                    if function.ret != Type::Void {
                        return Err("void return from a non-void function".to_string());
                    }
                    Ok(())
                }
            },
            Inst::Br(target) => check_target(*target),
            Inst::CondBr {
                cond,
                then_dest,
                else_dest,
            } => {
                check_operand(cond)?;
                if function.value_ty(cond) != Type::Int(1) {
                    return Err("conditional branch on a non-i1 value".to_string());
                }
                check_target(*then_dest)?;
                check_target(*else_dest)
            }
        }
    }
}

/// Instruction builder for one function, bound to a current insertion block.
pub struct FunctionBuilder<'m> {
    module: &'m mut Module,
    func: FuncId,
    current: BlockId,
}

impl<'m> FunctionBuilder<'m> {
    /// Starts building `func` with a fresh entry block.
    pub fn new(module: &'m mut Module, func: FuncId) -> FunctionBuilder<'m> {
        let mut builder = FunctionBuilder {
            module,
            func,
            current: BlockId(0),
        };
        let entry = builder.append_block("entry");
        builder.current = entry;
        builder
    }

    fn func(&self) -> &Function {
        &self.module.functions[self.func.0]
    }

    fn func_mut(&mut self) -> &mut Function {
        &mut self.module.functions[self.func.0]
    }

    pub fn module(&mut self) -> &mut Module {
        self.module
    }

    pub fn append_block(&mut self, name_hint: &str) -> BlockId {
        let name = self.func_mut().unique_name(name_hint);
        let function = self.func_mut();
        function.blocks.push(Block {
            name,
            insts: Vec::new(),
        });
        BlockId(function.blocks.len() - 1)
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    /// True if the current insertion block already ends in a terminator.
    /// Lowering consults this before emitting fallthrough branches so no
    /// block ever receives a second terminator.
    pub fn has_terminator(&self) -> bool {
        self.func().blocks[self.current.0]
            .insts
            .last()
            .is_some_and(Inst::is_terminator)
    }

    pub fn value_ty(&self, value: &Value) -> Type {
        self.func().value_ty(value)
    }

    fn push(&mut self, inst: Inst) {
        let current = self.current;
        self.func_mut().blocks[current.0].insts.push(inst);
    }

    fn new_value(&mut self, hint: &str, ty: Type) -> ValueId {
        let name = self.func_mut().unique_name(hint);
        let function = self.func_mut();
        function.values.push(ValueInfo { name, ty });
        ValueId(function.values.len() - 1)
    }

    pub fn build_alloca(&mut self, ty: Type, name: &str) -> Value {
        let dest = self.new_value(name, Type::Ptr);
        self.push(Inst::Alloca { dest, ty });
        Value::Inst(dest)
    }

    pub fn build_load(&mut self, ty: Type, ptr: Value, name: &str) -> Value {
        let dest = self.new_value(name, ty.clone());
        self.push(Inst::Load { dest, ty, ptr });
        Value::Inst(dest)
    }

    pub fn build_store(&mut self, value: Value, ptr: Value) {
        self.push(Inst::Store { value, ptr });
    }

    pub fn build_add(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        let ty = self.value_ty(&lhs);
        let dest = self.new_value(name, ty);
        self.push(Inst::Add { dest, lhs, rhs });
        Value::Inst(dest)
    }

    pub fn build_icmp(&mut self, pred: IcmpPred, lhs: Value, rhs: Value, name: &str) -> Value {
        let dest = self.new_value(name, Type::Int(1));
        self.push(Inst::ICmp {
            dest,
            pred,
            lhs,
            rhs,
        });
        Value::Inst(dest)
    }

    /// Emits the cast needed to bring an integer `value` to `to`. Widening
    /// uses sign- or zero-extension per `signed`; narrowing truncates; equal
    /// widths return the value untouched. Constants fold instead of
    /// emitting an instruction.
    pub fn build_int_cast(&mut self, value: Value, to: Type, signed: bool, name: &str) -> Value {
        let from_bits = self
            .value_ty(&value)
            .int_bits()
            .expect("int cast on integer operand");
        let to_bits = to.int_bits().expect("int cast to integer type");

        let op = match from_bits.cmp(&to_bits) {
            std::cmp::Ordering::Equal => return value,
            std::cmp::Ordering::Less => {
                if signed {
                    CastOp::Sext
                } else {
                    CastOp::Zext
                }
            }
            std::cmp::Ordering::Greater => CastOp::Trunc,
        };

        if let Value::ConstInt { value, .. } = value {
            let folded = match op {
                CastOp::Sext => sign_extend(from_bits, value),
                CastOp::Zext => low_bits(from_bits, value) as i64,
                CastOp::Trunc => sign_extend(to_bits, value),
            };
            return Value::ConstInt {
                ty: to,
                value: folded,
            };
        }

        let dest = self.new_value(name, to.clone());
        self.push(Inst::Cast {
            dest,
            op,
            value,
            to,
        });
        Value::Inst(dest)
    }

    pub fn build_extract_value(&mut self, agg: Value, index: usize, name: &str) -> Value {
        let field_ty = match self.value_ty(&agg) {
            Type::Struct(fields) => fields[index].clone(),
            other => panic!("extractvalue on non-aggregate type {other}"),
        };
        let dest = self.new_value(name, field_ty);
        self.push(Inst::ExtractValue { dest, agg, index });
        Value::Inst(dest)
    }

    pub fn build_insert_value(&mut self, agg: Value, value: Value, index: usize, name: &str) -> Value {
        let agg_ty = self.value_ty(&agg);
        let dest = self.new_value(name, agg_ty);
        self.push(Inst::InsertValue {
            dest,
            agg,
            value,
            index,
        });
        Value::Inst(dest)
    }

    /// Emits a call; returns `None` for void callees.
    pub fn build_call(&mut self, callee: FuncId, args: Vec<Value>, name: &str) -> Option<Value> {
        let ret = self.module.functions[callee.0].ret.clone();
        let dest = if ret == Type::Void {
            None
        } else {
            Some(self.new_value(name, ret))
        };
        self.push(Inst::Call { dest, callee, args });
        dest.map(Value::Inst)
    }

    pub fn build_ret(&mut self, value: Value) {
        self.push(Inst::Ret(Some(value)));
    }

    pub fn build_ret_void(&mut self) {
        self.push(Inst::Ret(None));
    }

    pub fn build_br(&mut self, dest: BlockId) {
        self.push(Inst::Br(dest));
    }

    pub fn build_cond_br(&mut self, cond: Value, then_dest: BlockId, else_dest: BlockId) {
        self.push(Inst::CondBr {
            cond,
            then_dest,
            else_dest,
        });
    }
}

/// Reads `value` as a signed `bits`-wide integer.
fn sign_extend(bits: u32, value: i64) -> i64 {
    if bits >= 64 {
        value
    } else {
        let shift = 64 - bits;
        (value << shift) >> shift
    }
}

/// Reads `value` as an unsigned `bits`-wide integer.
fn low_bits(bits: u32, value: i64) -> u64 {
    if bits >= 64 {
        value as u64
    } else {
        (value as u64) & ((1u64 << bits) - 1)
    }
}

// ---------------------------------------------------------------------
// Textual printing
// ---------------------------------------------------------------------

fn write_escaped_bytes(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    write!(f, "c\"")?;
    for &byte in bytes {
        match byte {
            b'"' | b'\\' => write!(f, "\\{:02X}", byte)?,
            0x20..=0x7e => write!(f, "{}", char::from(byte))?,
            _ => write!(f, "\\{:02X}", byte)?,
        }
    }
    write!(f, "\"")
}

fn write_value(f: &mut fmt::Formatter<'_>, module: &Module, function: &Function, value: &Value) -> fmt::Result {
    match value {
        Value::ConstInt { ty, value } => {
            if *ty == Type::Int(1) {
                write!(f, "{}", if *value != 0 { "true" } else { "false" })
            } else {
                write!(f, "{value}")
            }
        }
        Value::Global(id) => write!(f, "@{}", module.globals[id.0].name),
        Value::Param(index) => write!(f, "%{}", function.params[*index].0),
        Value::Inst(id) => write!(f, "%{}", function.values[id.0].name),
        Value::Undef(_) => write!(f, "undef"),
        Value::Zero(_) => write!(f, "zeroinitializer"),
    }
}

fn write_typed(f: &mut fmt::Formatter<'_>, module: &Module, function: &Function, value: &Value) -> fmt::Result {
    write!(f, "{} ", function.value_ty(value))?;
    write_value(f, module, function, value)
}

fn callconv_token(callconv: CallConv) -> &'static str {
    match callconv {
        CallConv::C => "",
        CallConv::Win64 => "win64cc ",
    }
}

fn write_inst(f: &mut fmt::Formatter<'_>, module: &Module, function: &Function, inst: &Inst) -> fmt::Result {
    write!(f, "  ")?;
    match inst {
        Inst::Alloca { dest, ty } => {
            write!(f, "%{} = alloca {ty}", function.values[dest.0].name)
        }
        Inst::Load { dest, ty, ptr } => {
            write!(f, "%{} = load {ty}, ", function.values[dest.0].name)?;
            write_typed(f, module, function, ptr)
        }
        Inst::Store { value, ptr } => {
            write!(f, "store ")?;
            write_typed(f, module, function, value)?;
            write!(f, ", ")?;
            write_typed(f, module, function, ptr)
        }
        Inst::Add { dest, lhs, rhs } => {
            write!(
                f,
                "%{} = add {} ",
                function.values[dest.0].name,
                function.value_ty(lhs)
            )?;
            write_value(f, module, function, lhs)?;
            write!(f, ", ")?;
            write_value(f, module, function, rhs)
        }
        Inst::ICmp {
            dest,
            pred,
            lhs,
            rhs,
        } => {
            write!(
                f,
                "%{} = icmp {} {} ",
                function.values[dest.0].name,
                pred.token(),
                function.value_ty(lhs)
            )?;
            write_value(f, module, function, lhs)?;
            write!(f, ", ")?;
            write_value(f, module, function, rhs)
        }
        Inst::Cast {
            dest,
            op,
            value,
            to,
        } => {
            write!(f, "%{} = {} ", function.values[dest.0].name, op.token())?;
            write_typed(f, module, function, value)?;
            write!(f, " to {to}")
        }
        Inst::ExtractValue { dest, agg, index } => {
            write!(f, "%{} = extractvalue ", function.values[dest.0].name)?;
            write_typed(f, module, function, agg)?;
            write!(f, ", {index}")
        }
        Inst::InsertValue {
            dest,
            agg,
            value,
            index,
        } => {
            write!(f, "%{} = insertvalue ", function.values[dest.0].name)?;
            write_typed(f, module, function, agg)?;
            write!(f, ", ")?;
            write_typed(f, module, function, value)?;
            write!(f, ", {index}")
        }
        Inst::Call { dest, callee, args } => {
            let callee = &module.functions[callee.0];
            if let Some(dest) = dest {
                write!(f, "%{} = ", function.values[dest.0].name)?;
            }
            write!(f, "call {}", callconv_token(callee.callconv))?;
            if callee.is_variadic {
                write!(f, "{} (", callee.ret)?;
                for (i, (_, ty)) in callee.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ", ...)")?;
            } else {
                write!(f, "{}", callee.ret)?;
            }
            write!(f, " @{}(", callee.name)?;
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_typed(f, module, function, arg)?;
            }
            write!(f, ")")
        }
        Inst::Ret(value) => match value {
            Some(value) => {
                write!(f, "ret ")?;
                write_typed(f, module, function, value)
            }
            None => write!(f, "ret void"),
        },
        Inst::Br(target) => write!(f, "br label %{}", function.blocks[target.0].name),
        Inst::CondBr {
            cond,
            then_dest,
            else_dest,
        } => {
            write!(f, "br i1 ")?;
            write_value(f, module, function, cond)?;
            write!(
                f,
                ", label %{}, label %{}",
                function.blocks[then_dest.0].name, function.blocks[else_dest.0].name
            )
        }
    }
}

fn write_function(f: &mut fmt::Formatter<'_>, module: &Module, function: &Function) -> fmt::Result {
    if function.is_declaration() {
        write!(
            f,
            "declare {}{} @{}(",
            callconv_token(function.callconv),
            function.ret,
            function.name
        )?;
        for (i, (_, ty)) in function.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{ty}")?;
        }
        if function.is_variadic {
            if !function.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        return writeln!(f, ")");
    }

    write!(
        f,
        "define {}{}{} @{}(",
        function.linkage.token(),
        callconv_token(function.callconv),
        function.ret,
        function.name
    )?;
    for (i, (name, ty)) in function.params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{ty} %{name}")?;
    }
    writeln!(f, ") {{")?;

    for (i, block) in function.blocks.iter().enumerate() {
        if i > 0 {
            writeln!(f)?;
        }
        writeln!(f, "{}:", block.name)?;
        for inst in &block.insts {
            write_inst(f, module, function, inst)?;
            writeln!(f)?;
        }
    }

    writeln!(f, "}}")
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        writeln!(f, "source_filename = \"{}\"", self.name)?;
        writeln!(f, "target triple = \"{}\"", self.triple)?;

        if !self.globals.is_empty() {
            writeln!(f)?;
            for global in &self.globals {
                write!(
                    f,
                    "@{} = {}{} {} ",
                    global.name,
                    global.linkage.token(),
                    if global.is_const { "constant" } else { "global" },
                    global.ty(),
                )?;
                write_escaped_bytes(f, &global.bytes)?;
                writeln!(f)?;
            }
        }

        for function in &self.functions {
            writeln!(f)?;
            write_function(f, self, function)?;
        }

        Ok(())
    }
}
