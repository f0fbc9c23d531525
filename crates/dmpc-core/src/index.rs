// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Layout of an agent's extended state and control vectors.
//!
//! The extended state is `[x_i, x_j1, x_j2, ...]`, the extended control is
//! `[u_i, u_j1, v_j1, u_j2, v_j2, ...]`, where blocks follow the neighbor list
//! order. [`IndexMap`] hands out typed ranges into those vectors so nothing
//! downstream does offset arithmetic by hand.

use std::ops::Range;

use crate::agent::AgentId;
use crate::error::ConfigError;

/// Ranges of one neighbor's blocks inside the extended vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborBlock {
    /// Neighbor id.
    pub id: AgentId,
    /// `x_ji` inside the extended state.
    pub x: Range<usize>,
    /// `u_ji` inside the extended control.
    pub u: Range<usize>,
    /// `v_ji` inside the extended control.
    pub v: Range<usize>,
}

impl NeighborBlock {
    /// `x_ji` inside an extended state vector.
    pub fn x_of<'s>(&self, x: &'s [f64]) -> &'s [f64] {
        &x[self.x.clone()]
    }

    /// `x_ji` inside an extended state-sized buffer, mutably.
    pub fn x_of_mut<'s>(&self, x: &'s mut [f64]) -> &'s mut [f64] {
        &mut x[self.x.clone()]
    }

    /// `u_ji` inside an extended control vector.
    pub fn u_of<'s>(&self, u: &'s [f64]) -> &'s [f64] {
        &u[self.u.clone()]
    }

    /// `u_ji` inside an extended control-sized buffer, mutably.
    pub fn u_of_mut<'s>(&self, u: &'s mut [f64]) -> &'s mut [f64] {
        &mut u[self.u.clone()]
    }

    /// `v_ji` inside an extended control vector.
    pub fn v_of<'s>(&self, u: &'s [f64]) -> &'s [f64] {
        &u[self.v.clone()]
    }

    /// `v_ji` inside an extended control-sized buffer, mutably.
    pub fn v_of_mut<'s>(&self, u: &'s mut [f64]) -> &'s mut [f64] {
        &mut u[self.v.clone()]
    }
}

/// Offsets of every neighbor block for one agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMap {
    nx_i: usize,
    nu_i: usize,
    nx: usize,
    nu: usize,
    blocks: Vec<NeighborBlock>,
    // Dense id -> position in `blocks`.
    lookup: Vec<Option<usize>>,
}

impl IndexMap {
    /// Builds the map for an agent with dimensions `(nx_i, nu_i)` and the given
    /// neighbors `(id, nx_j, nu_j)` in iteration order.
    ///
    /// Each neighbor contributes `nx_j` extended states and `nu_j + nx_j`
    /// extended controls (its copied control followed by its influence slot).
    pub fn build(
        agent: AgentId,
        nx_i: usize,
        nu_i: usize,
        neighbors: impl IntoIterator<Item = (AgentId, usize, usize)>,
    ) -> Result<Self, ConfigError> {
        check_dimensions(agent, nx_i, nu_i)?;

        let mut map = Self {
            nx_i,
            nu_i,
            nx: nx_i,
            nu: nu_i,
            blocks: Vec::new(),
            lookup: Vec::new(),
        };

        for (id, nx_j, nu_j) in neighbors {
            check_dimensions(id, nx_j, nu_j)?;
            if map.lookup.len() <= id.index() {
                map.lookup.resize(id.index() + 1, None);
            }
            if map.lookup[id.index()].is_some() || id == agent {
                return Err(ConfigError::DuplicateNeighbor { agent, neighbor: id });
            }

            let x = map.nx..map.nx + nx_j;
            let u = map.nu..map.nu + nu_j;
            let v = u.end..u.end + nx_j;
            map.nx = x.end;
            map.nu = v.end;

            map.lookup[id.index()] = Some(map.blocks.len());
            map.blocks.push(NeighborBlock { id, x, u, v });
        }

        log::trace!(
            "IndexMap[agent {}]: Nx = {}, Nu = {} over {} neighbors",
            agent,
            map.nx,
            map.nu,
            map.blocks.len()
        );
        Ok(map)
    }

    /// Own state dimension.
    pub fn nx_i(&self) -> usize {
        self.nx_i
    }

    /// Own control dimension.
    pub fn nu_i(&self) -> usize {
        self.nu_i
    }

    /// Extended state dimension `Nx`.
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Extended control dimension `Nu`.
    pub fn nu(&self) -> usize {
        self.nu
    }

    /// Range of the agent's own state.
    pub fn own_x(&self) -> Range<usize> {
        0..self.nx_i
    }

    /// Range of the agent's own control.
    pub fn own_u(&self) -> Range<usize> {
        0..self.nu_i
    }

    /// Blocks in neighbor order.
    pub fn blocks(&self) -> &[NeighborBlock] {
        &self.blocks
    }

    /// Block of neighbor `j`, if it is one.
    pub fn block(&self, j: AgentId) -> Option<&NeighborBlock> {
        let position = (*self.lookup.get(j.index())?)?;
        self.blocks.get(position)
    }

    /// Start of `x_ji` in the extended state.
    pub fn x_index_xji(&self, j: AgentId) -> Option<usize> {
        self.block(j).map(|b| b.x.start)
    }

    /// Start of `u_ji` in the extended control.
    pub fn u_index_uji(&self, j: AgentId) -> Option<usize> {
        self.block(j).map(|b| b.u.start)
    }

    /// Start of `v_ji` in the extended control.
    pub fn u_index_vji(&self, j: AgentId) -> Option<usize> {
        self.block(j).map(|b| b.v.start)
    }
}

fn check_dimensions(agent: AgentId, nx: usize, nu: usize) -> Result<(), ConfigError> {
    if nx == 0 {
        return Err(ConfigError::NonPositiveDimension { agent, what: "state" });
    }
    if nu == 0 {
        return Err(ConfigError::NonPositiveDimension { agent, what: "control" });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_neighbors_is_identity_layout() {
        let map = IndexMap::build(AgentId(0), 3, 2, []).unwrap();
        assert_eq!(map.nx(), 3);
        assert_eq!(map.nu(), 2);
        assert!(map.blocks().is_empty());
        assert_eq!(map.x_index_xji(AgentId(1)), None);
    }

    #[test]
    fn test_blocks_follow_iteration_order_not_id_order() {
        let map = IndexMap::build(
            AgentId(1),
            2,
            1,
            [(AgentId(7), 1, 2), (AgentId(0), 3, 1)],
        )
        .unwrap();

        assert_eq!(map.nx(), 2 + 1 + 3);
        assert_eq!(map.nu(), 1 + (2 + 1) + (1 + 3));

        assert_eq!(map.x_index_xji(AgentId(7)), Some(2));
        assert_eq!(map.u_index_uji(AgentId(7)), Some(1));
        assert_eq!(map.u_index_vji(AgentId(7)), Some(3));

        assert_eq!(map.x_index_xji(AgentId(0)), Some(3));
        assert_eq!(map.u_index_uji(AgentId(0)), Some(4));
        assert_eq!(map.u_index_vji(AgentId(0)), Some(5));
    }

    #[test]
    fn test_duplicate_neighbor_rejected() {
        let err = IndexMap::build(AgentId(0), 1, 1, [(AgentId(2), 1, 1), (AgentId(2), 1, 1)])
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateNeighbor {
                agent: AgentId(0),
                neighbor: AgentId(2)
            }
        );
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(matches!(
            IndexMap::build(AgentId(0), 0, 1, []),
            Err(ConfigError::NonPositiveDimension { what: "state", .. })
        ));
        assert!(matches!(
            IndexMap::build(AgentId(0), 1, 1, [(AgentId(3), 2, 0)]),
            Err(ConfigError::NonPositiveDimension { what: "control", .. })
        ));
    }
}
