//! Parallel-usage checking.
//!
//! Channels in compiled programs are single-reader, single-writer, and PAR
//! arms may not write the same variable. Each node contributes its reads,
//! writes, and channel endpoints through the `do_usagecheck` langop; the
//! check runs every PAR's arms separately and reports overlapping writes,
//! overlapping senders, and overlapping receivers.

use ahash::AHashSet;

use crate::{
    compiler::Compiler,
    names::NameId,
    ops::{LangOp, LangReq},
    tree::NodeId,
};

/// Usage sets of one PAR arm.
#[derive(Debug, Default)]
struct UsageSet {
    writes: AHashSet<NameId>,
    inputs: AHashSet<NameId>,
    outputs: AHashSet<NameId>,
}

fn collect_usage(comp: &mut Compiler, node: NodeId) -> UsageSet {
    let mut usage = UsageSet::default();
    let mut stack = vec![node];
    while let Some(n) = stack.pop() {
        let mut req = LangReq::DoUsagecheck {
            reads: Vec::new(),
            writes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        };
        if comp.call_langop(n, LangOp::DoUsagecheck, &mut req)
            && let LangReq::DoUsagecheck {
                writes,
                inputs,
                outputs,
                ..
            } = req
        {
            usage.writes.extend(writes);
            usage.inputs.extend(inputs);
            usage.outputs.extend(outputs);
        }
        stack.extend(comp.tree.sub_ids(n));
        stack.extend(comp.tree.hook_ids(n));
    }
    usage
}

/// Checks every PAR in the tree: arms may not write the same variable, and
/// a channel has at most one sending arm and one receiving arm.
pub fn usagecheck_tree(comp: &mut Compiler, root: NodeId) {
    let Some(gup) = comp.guppy else {
        // no front-end registered: nothing to check
        return;
    };
    let mut pars = Vec::new();
    comp.prewalk(root, &mut |c, n| {
        if c.tree.tag(n) == gup.par {
            pars.push(n);
        }
        true
    });

    for par in pars {
        let Some(body) = comp.sub(par, 1) else { continue };
        if !comp.is_list(body) {
            continue;
        }
        let arms = comp.list_items(body);
        let usages: Vec<UsageSet> = arms.iter().map(|&arm| collect_usage(comp, arm)).collect();
        for i in 0..usages.len() {
            for j in (i + 1)..usages.len() {
                for name in usages[i].writes.intersection(&usages[j].writes) {
                    let ident = comp.names.ident(*name).to_owned();
                    comp.error_at(par, format!("parallel processes both write [{ident}]"));
                }
                for name in usages[i].outputs.intersection(&usages[j].outputs) {
                    let ident = comp.names.ident(*name).to_owned();
                    comp.error_at(par, format!("parallel processes both output on [{ident}]"));
                }
                for name in usages[i].inputs.intersection(&usages[j].inputs) {
                    let ident = comp.names.ident(*name).to_owned();
                    comp.error_at(par, format!("parallel processes both input on [{ident}]"));
                }
            }
        }
    }
}
