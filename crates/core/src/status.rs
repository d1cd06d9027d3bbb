//! Status record persisted on the request.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorPhase {
    Installing,
    Running,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServicePhase {
    Running,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClusterPhase {
    #[default]
    Pending,
    Installing,
    Running,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberPhase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_phase: Option<OperatorPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand_phase: Option<ServicePhase>,
}

/// A custom resource created for an operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperandCrMember {
    pub name: String,
    pub kind: String,
    pub api_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStatus {
    pub name: String,
    #[serde(default)]
    pub phase: MemberPhase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operand_cr_list: Vec<OperandCrMember>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatus {
    #[serde(default)]
    pub phase: ClusterPhase,
    #[serde(default)]
    pub members: Vec<MemberStatus>,
}

impl RequestStatus {
    fn member_mut(&mut self, name: &str) -> &mut MemberStatus {
        if let Some(pos) = self.members.iter().position(|m| m.name == name) {
            return &mut self.members[pos];
        }
        self.members.push(MemberStatus { name: name.to_string(), ..Default::default() });
        let last = self.members.len() - 1;
        &mut self.members[last]
    }

    pub fn member(&self, name: &str) -> Option<&MemberStatus> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Record phases for `name`; `None` leaves that dimension unchanged.
    pub fn set_member_status(&mut self, name: &str, operator: Option<OperatorPhase>, service: Option<ServicePhase>) {
        let member = self.member_mut(name);
        if let Some(p) = operator {
            member.phase.operator_phase = Some(p);
        }
        if let Some(p) = service {
            member.phase.operand_phase = Some(p);
        }
    }

    pub fn set_member_cr(&mut self, name: &str, cr: OperandCrMember) {
        let member = self.member_mut(name);
        if !member.operand_cr_list.iter().any(|c| c.name == cr.name && c.kind == cr.kind) {
            member.operand_cr_list.push(cr);
        }
    }

    pub fn remove_member_cr(&mut self, name: &str, cr_name: &str, kind: &str) {
        if let Some(member) = self.members.iter_mut().find(|m| m.name == name) {
            member.operand_cr_list.retain(|c| !(c.name == cr_name && c.kind == kind));
        }
    }

    /// Recorded custom resources as `(operand, member)` pairs.
    pub fn recorded_crs(&self) -> Vec<(String, OperandCrMember)> {
        self.members
            .iter()
            .flat_map(|m| m.operand_cr_list.iter().map(move |cr| (m.name.clone(), cr.clone())))
            .collect()
    }

    /// Failed wins over installing, installing over running.
    pub fn update_cluster_phase(&mut self) {
        let (mut failed, mut installing, mut running) = (0usize, 0usize, 0usize);
        for m in &self.members {
            match m.phase.operator_phase {
                Some(OperatorPhase::Failed) => failed += 1,
                Some(OperatorPhase::Installing) => installing += 1,
                Some(OperatorPhase::Running) => running += 1,
                None => {}
            }
            match m.phase.operand_phase {
                Some(ServicePhase::Failed) => failed += 1,
                Some(ServicePhase::Running) => running += 1,
                None => {}
            }
        }
        self.phase = if failed > 0 {
            ClusterPhase::Failed
        } else if installing > 0 {
            ClusterPhase::Installing
        } else if running > 0 {
            ClusterPhase::Running
        } else {
            ClusterPhase::Pending
        };
    }
}
