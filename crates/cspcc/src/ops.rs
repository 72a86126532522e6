//! Operation dispatch: compiler operations and language operations.
//!
//! Each node type owns two slot-indexed tables. Compops transform the tree
//! (one slot per pipeline phase); langops answer queries about nodes. A
//! table may sit above a `next` table: slots holding the `Callthrough`
//! sentinel re-dispatch downward, which gives method-override-with-super
//! composition without inheritance. Tables are built during front-end/
//! back-end registration and immutable afterwards.

use strum::EnumCount;

use crate::{
    compiler::Compiler,
    constants::ConstData,
    origin::OpOrigin,
    passes::PassState,
    tree::NodeId,
};

/// Compiler operations, in pipeline order.
///
/// The first block is the builtin set every language sees; the second block
/// holds the operations the Guppy front-end and the CCSP back-end append
/// (the registry is append-only, so their discriminants are equally stable).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::IntoStaticStr, strum::EnumCount,
)]
#[strum(serialize_all = "lowercase")]
pub enum CompOp {
    Prescope,
    ScopeIn,
    ScopeOut,
    Typecheck,
    Constprop,
    Typeresolve,
    Precheck,
    Tracescheck,
    Mobilitycheck,
    Postcheck,
    Fetrans,
    Betrans,
    Premap,
    Namemap,
    Bemap,
    Preallocate,
    Precode,
    Codegen,
    // appended by front-ends/back-ends
    Declify,
    Autoseq,
    Flattenseq,
    Fetrans1,
    Fetrans15,
    Fetrans2,
    Fetrans3,
    Lpreallocate,
    Dcg,
    Reallocate,
}

impl CompOp {
    /// Trace name, as matched against `--trace-compops`.
    #[must_use]
    pub fn trace_name(self) -> &'static str {
        self.into()
    }
}

/// Language operations: node-type queries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::IntoStaticStr, strum::EnumCount,
)]
#[strum(serialize_all = "lowercase")]
pub enum LangOp {
    GetDescriptor,
    GetName,
    DoUsagecheck,
    TypeActual,
    TypeReduce,
    CanTypeCast,
    GetType,
    GetSubType,
    BytesFor,
    IsSigned,
    IsConst,
    IsVar,
    IsType,
    IsComplex,
    ConstValOf,
    ValByRef,
    InitSizes,
    InitialisingDecl,
    CodegenTypeAction,
    CodegenTypeRangeCheck,
    CodegenAltPreEnable,
    CodegenAltEnable,
    CodegenAltDisable,
    PremapTypeForVarDecl,
    RetypeConst,
    DimTreeOf,
    HiddenParamsOf,
    HiddenSlotsOf,
    TypeHash,
    TypeType,
    GetBaseName,
    IsDefPointer,
    InitCall,
    FreeCall,
    GuessTlp,
    GetCTypeOf,
}

impl LangOp {
    /// Trace name, as matched against `--trace-langops`.
    #[must_use]
    pub fn trace_name(self) -> &'static str {
        self.into()
    }
}

/// A compop implementation.
///
/// Receives the compiler context, the pass state, and the slot holding the
/// node (implementations may replace the node through it). Returns whether
/// the driving walk should descend into the (possibly replaced) node's
/// children.
pub type CompOpFn = fn(&mut Compiler, &mut PassState, &mut NodeId) -> bool;

/// A langop implementation.
///
/// Fills in the output fields of the request. Returns `false` when the
/// implementation declines the query (treated the same as no registration).
pub type LangOpFn = fn(&mut Compiler, NodeId, &mut LangReq) -> bool;

/// In/out parameter block for language operations.
///
/// One variant per query the pipeline issues; callers construct the variant
/// with outputs at their defaults and read them back after dispatch.
#[derive(Debug)]
pub enum LangReq {
    GetType {
        default: Option<NodeId>,
        result: Option<NodeId>,
    },
    GetSubType {
        result: Option<NodeId>,
    },
    /// Check an actual against a formal; `result` is the resolved type on
    /// success, `None` on mismatch (the caller reports).
    TypeActual {
        formal: NodeId,
        actual: NodeId,
        result: Option<NodeId>,
    },
    TypeReduce {
        result: Option<NodeId>,
    },
    CanTypeCast {
        to: NodeId,
        result: bool,
    },
    BytesFor {
        result: Option<i64>,
    },
    IsSigned {
        result: bool,
    },
    IsConst {
        result: bool,
    },
    IsVar {
        result: bool,
    },
    IsType {
        result: bool,
    },
    IsComplex {
        deep: bool,
        result: bool,
    },
    ConstValOf {
        result: Option<ConstData>,
    },
    ValByRef {
        result: bool,
    },
    /// Default pointer-indirection level of a type (0 for plain values).
    IsDefPointer {
        result: i32,
    },
    /// Initialiser call for a declared variable of this type, if any.
    InitCall {
        var: NodeId,
        result: Option<NodeId>,
    },
    /// Finaliser call for a declared variable of this type, if any.
    FreeCall {
        var: NodeId,
        result: Option<NodeId>,
    },
    /// Stable hash of a protocol/type for ANY-protocol tagging.
    TypeHash {
        result: u32,
    },
    GetName {
        result: Option<String>,
    },
    GetBaseName {
        result: Option<String>,
    },
    /// C type spelling used by the code generator.
    GetCTypeOf {
        result: Option<String>,
    },
    GetDescriptor {
        result: String,
    },
    /// Whether this definition looks like a top-level process.
    GuessTlp {
        result: bool,
    },
    /// Hidden formal parameters contributed by a type (e.g. array dims).
    HiddenParamsOf {
        result: Vec<NodeId>,
    },
    DimTreeOf {
        result: Option<NodeId>,
    },
    RetypeConst {
        typ: NodeId,
        result: Option<NodeId>,
    },
    /// Usage-check contribution of a node: names it reads and writes, plus
    /// channel endpoints it inputs from or outputs to. Channel operands are
    /// their own categories so concurrent readers/writers of one channel
    /// are caught.
    DoUsagecheck {
        reads: Vec<crate::names::NameId>,
        writes: Vec<crate::names::NameId>,
        inputs: Vec<crate::names::NameId>,
        outputs: Vec<crate::names::NameId>,
    },
    /// Emit the C form of an action (assign/input/output) whose operand
    /// type needs special handling; text is appended to `out`.
    CodegenTypeAction {
        lhs: NodeId,
        rhs: Option<NodeId>,
        out: String,
    },
}

/// One slot of an operation table.
#[derive(Debug, Clone, Copy)]
pub enum OpSlot<F> {
    /// No implementation at this level or below.
    Missing,
    /// Re-dispatch to the `next` table.
    Callthrough,
    /// An implementation, with the origin that registered it.
    Present(F, OpOrigin),
}

/// A slot-indexed operation table with an optional `next` table underneath.
#[derive(Debug)]
pub struct OpTable<F> {
    slots: Vec<OpSlot<F>>,
    next: Option<Box<OpTable<F>>>,
}

impl<F: Copy> OpTable<F> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            next: None,
        }
    }

    fn slot(&self, idx: usize) -> OpSlot<F>
    where
        F: Copy,
    {
        self.slots.get(idx).copied().unwrap_or(OpSlot::Missing)
    }

    fn ensure(&mut self, idx: usize) {
        if self.slots.len() <= idx {
            self.slots.resize_with(idx + 1, || OpSlot::Missing);
        }
    }

    /// Sets an implementation in this table.
    pub fn set(&mut self, idx: usize, f: F, origin: OpOrigin) {
        self.ensure(idx);
        self.slots[idx] = OpSlot::Present(f, origin);
    }

    /// Sets an implementation underneath any existing overrides: walks to
    /// the bottom of the chain and installs there.
    pub fn set_bottom(&mut self, idx: usize, f: F, origin: OpOrigin) {
        let mut table = self;
        while table.next.is_some() {
            table.ensure(idx);
            if matches!(table.slots[idx], OpSlot::Missing) {
                table.slots[idx] = OpSlot::Callthrough;
            }
            table = table.next.as_mut().unwrap();
        }
        table.set(idx, f, origin);
    }

    /// Pushes a fresh override table above the current one. Every slot of
    /// the new table starts as `Callthrough`, so dispatch cascades
    /// transparently until the new table overrides a slot.
    pub fn insert_above(&mut self) {
        let old = std::mem::replace(
            self,
            Self {
                slots: Vec::new(),
                next: None,
            },
        );
        let depth = old.slots.len();
        self.slots = vec![OpSlot::Callthrough; depth.max(1)];
        self.next = Some(Box::new(old));
    }

    /// Removes the topmost table, exposing the one underneath.
    ///
    /// # Panics
    /// Panics when there is no table underneath.
    pub fn remove_top(&mut self) {
        let next = self.next.take().expect("remove_top on a single-level op table");
        *self = *next;
    }

    /// Resolves the implementation for a slot, following `Callthrough`
    /// sentinels down the chain. The resolved implementation runs exactly
    /// once regardless of chain depth.
    #[must_use]
    pub fn resolve(&self, idx: usize) -> Option<(F, OpOrigin)> {
        match self.slot(idx) {
            OpSlot::Present(f, origin) => Some((f, origin)),
            OpSlot::Callthrough => self.next.as_ref().and_then(|n| n.resolve(idx)),
            OpSlot::Missing => None,
        }
    }

    /// Whether a slot resolves to an implementation anywhere in the chain.
    #[must_use]
    pub fn has(&self, idx: usize) -> bool {
        self.resolve(idx).is_some()
    }

    /// Number of chained tables (for dumps).
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.next.as_ref().map_or(0, |n| n.depth())
    }
}

impl<F: Copy> Default for OpTable<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Sizes the compop table index space.
pub const COMPOP_COUNT: usize = CompOp::COUNT;
/// Sizes the langop table index space.
pub const LANGOP_COUNT: usize = LangOp::COUNT;

#[cfg(test)]
mod tests {
    use super::*;

    type TestFn = fn() -> u32;

    fn one() -> u32 {
        1
    }
    fn two() -> u32 {
        2
    }
    fn three() -> u32 {
        3
    }

    #[test]
    fn test_callthrough_cascade_runs_bottom_exactly_once() {
        // C implements op 4; B and A sit above with callthrough slots.
        let mut table: OpTable<TestFn> = OpTable::new();
        table.set(4, three, OpOrigin::CORE);
        table.insert_above(); // B
        table.insert_above(); // A

        let (f, _) = table.resolve(4).expect("resolves through two levels");
        assert_eq!(f(), 3);
        assert_eq!(table.depth(), 3);
    }

    #[test]
    fn test_override_shadows_lower_table() {
        let mut table: OpTable<TestFn> = OpTable::new();
        table.set(0, one, OpOrigin::CORE);
        table.insert_above();
        table.set(0, two, OpOrigin::frontend("test"));

        let (f, origin) = table.resolve(0).expect("top override resolves");
        assert_eq!(f(), 2);
        assert_eq!(origin, OpOrigin::frontend("test"));

        table.remove_top();
        let (f, _) = table.resolve(0).expect("bottom still present");
        assert_eq!(f(), 1);
    }

    #[test]
    fn test_set_bottom_installs_under_overrides() {
        let mut table: OpTable<TestFn> = OpTable::new();
        table.set(1, one, OpOrigin::CORE);
        table.insert_above();
        table.set(1, two, OpOrigin::frontend("test"));

        // slot 2 has no impl anywhere; set_bottom installs it in the base
        table.set_bottom(2, three, OpOrigin::CORE);
        let (f, _) = table.resolve(2).expect("bottom install resolves");
        assert_eq!(f(), 3);

        // the top override of slot 1 is untouched
        let (f, _) = table.resolve(1).expect("override still resolves");
        assert_eq!(f(), 2);
    }

    #[test]
    fn test_missing_slot_resolves_to_none() {
        let table: OpTable<TestFn> = OpTable::new();
        assert!(table.resolve(7).is_none());
        assert!(!table.has(7));
    }
}
