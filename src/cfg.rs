//! Control flow graph consumed from semantic analysis: one per routine,
//! plus the `main` program body. The codegen walks these in block-ID
//! order and never reconstructs or rewrites them.

use crate::ast::Statement;
use crate::types::TypeDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub type BlockId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopHeaderKind {
    ForHeader,
    WhileHeader,
    DoHeader,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: String,
    pub statements: Vec<Statement>,
    pub loop_header: Option<LoopHeaderKind>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeType {
    Fallthrough,
    Jump,
    ConditionalTrue,
    ConditionalFalse,
    Call,
    Return,
    Exception,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgEdge {
    pub source: BlockId,
    pub target: BlockId,
    pub edge_type: EdgeType,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    pub blocks: Vec<BasicBlock>,
    pub edges: Vec<CfgEdge>,
    pub entry_block: BlockId,
    pub parameters: Vec<String>,
    pub gosub_return_blocks: HashSet<BlockId>,
    pub return_type: TypeDescriptor,
}

impl ControlFlowGraph {
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn out_edges(&self, id: BlockId) -> Vec<&CfgEdge> {
        self.edges.iter().filter(|e| e.source == id).collect()
    }

    /// Blocks in ascending ID order. The driver emits in this order
    /// unconditionally (not a reachability walk) so that GOSUB/ON-GOTO
    /// computed targets always have a label to jump to, even when a
    /// strict DFS from the entry would prune them.
    pub fn blocks_in_id_order(&self) -> Vec<&BasicBlock> {
        let mut blocks: Vec<&BasicBlock> = self.blocks.iter().collect();
        blocks.sort_by_key(|b| b.id);
        blocks
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramCfg {
    pub main_cfg: ControlFlowGraph,
    pub function_cfgs: std::collections::BTreeMap<String, ControlFlowGraph>,
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        ControlFlowGraph {
            blocks: Vec::new(),
            edges: Vec::new(),
            entry_block: 0,
            parameters: Vec::new(),
            gosub_return_blocks: HashSet::new(),
            return_type: TypeDescriptor::new(crate::types::BaseType::Void),
        }
    }
}
