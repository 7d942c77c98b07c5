//! Shared mutable state coupling the finder and the multi-vertex fitter.
//!
//! The state owns every vertex candidate in a monotonically growing arena.
//! All other indices refer to candidates by [`VertexHandle`]; removing a
//! candidate clears it from every index before its slot is released.

use crate::error::VertexingError;
use crate::types::{TrackAtVertex, TrackHandle, Vertex, VertexHandle, VertexInfo};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct FitterState {
    /// Candidate storage; `None` marks a released slot
    vertices: Vec<Option<Vertex>>,

    /// Per-vertex constraint, seed and track links
    pub vtx_info_map: HashMap<VertexHandle, VertexInfo>,

    /// (track, vertex) → association record
    pub tracks_at_vertices: HashMap<(TrackHandle, VertexHandle), TrackAtVertex>,

    /// Vertices refit together by the next `fit` call, in order
    pub vertex_collection: Vec<VertexHandle>,

    /// Track → vertices it is linked to, in registration order
    pub multi_map: HashMap<TrackHandle, Vec<VertexHandle>>,
}

impl FitterState {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // ARENA
    // ========================================================================

    /// Stores a new candidate and returns its handle.
    pub fn insert_vertex(&mut self, vertex: Vertex) -> VertexHandle {
        let handle = VertexHandle(self.vertices.len());
        self.vertices.push(Some(vertex));
        handle
    }

    pub fn vertex(&self, handle: VertexHandle) -> Result<&Vertex, VertexingError> {
        self.vertices
            .get(handle.0)
            .and_then(Option::as_ref)
            .ok_or(VertexingError::VertexNotFound(handle))
    }

    pub fn vertex_mut(&mut self, handle: VertexHandle) -> Result<&mut Vertex, VertexingError> {
        self.vertices
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(VertexingError::VertexNotFound(handle))
    }

    /// Number of live candidates.
    pub fn live_vertex_count(&self) -> usize {
        self.vertices.iter().filter(|v| v.is_some()).count()
    }

    // ========================================================================
    // INDEX ACCESS
    // ========================================================================

    pub fn info(&self, handle: VertexHandle) -> Result<&VertexInfo, VertexingError> {
        self.vtx_info_map
            .get(&handle)
            .ok_or(VertexingError::VertexNotFound(handle))
    }

    pub fn info_mut(&mut self, handle: VertexHandle) -> Result<&mut VertexInfo, VertexingError> {
        self.vtx_info_map
            .get_mut(&handle)
            .ok_or(VertexingError::VertexNotFound(handle))
    }

    /// Linked tracks of a vertex, in attachment order.
    pub fn track_links(&self, handle: VertexHandle) -> Result<&[TrackHandle], VertexingError> {
        Ok(&self.info(handle)?.track_links)
    }

    pub fn track_at_vertex(
        &self,
        track: TrackHandle,
        vertex: VertexHandle,
    ) -> Result<&TrackAtVertex, VertexingError> {
        self.tracks_at_vertices
            .get(&(track, vertex))
            .ok_or(VertexingError::TrackAtVertexNotFound(track, vertex))
    }

    pub fn track_at_vertex_mut(
        &mut self,
        track: TrackHandle,
        vertex: VertexHandle,
    ) -> Result<&mut TrackAtVertex, VertexingError> {
        self.tracks_at_vertices
            .get_mut(&(track, vertex))
            .ok_or(VertexingError::TrackAtVertexNotFound(track, vertex))
    }

    /// Vertices a track is registered with.
    pub fn vertices_of_track(&self, track: TrackHandle) -> &[VertexHandle] {
        self.multi_map.get(&track).map(Vec::as_slice).unwrap_or(&[])
    }

    // ========================================================================
    // MULTI-MAP MAINTENANCE
    // ========================================================================

    /// Registers the vertex with each of its linked tracks.
    pub fn add_vertex_to_multi_map(&mut self, vertex: VertexHandle) -> Result<(), VertexingError> {
        let links = self.info(vertex)?.track_links.clone();
        for track in links {
            let entry = self.multi_map.entry(track).or_default();
            if !entry.contains(&vertex) {
                entry.push(vertex);
            }
        }
        Ok(())
    }

    /// Removes the vertex from the multi-map, dropping empty track entries.
    pub fn remove_vertex_from_multi_map(
        &mut self,
        vertex: VertexHandle,
    ) -> Result<(), VertexingError> {
        let links = self.info(vertex)?.track_links.clone();
        for track in links {
            if let Some(vertices) = self.multi_map.get_mut(&track) {
                vertices.retain(|&v| v != vertex);
                if vertices.is_empty() {
                    self.multi_map.remove(&track);
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // CANDIDATE REMOVAL
    // ========================================================================

    /// Removes a candidate from every index and releases its arena slot.
    ///
    /// The candidate's track associations are dropped along with their
    /// linearization. Returns the released vertex.
    pub fn remove_vertex(&mut self, vertex: VertexHandle) -> Result<Vertex, VertexingError> {
        if self.vtx_info_map.contains_key(&vertex) {
            self.remove_vertex_from_multi_map(vertex)?;
        }
        self.vertex_collection.retain(|&v| v != vertex);

        if let Some(info) = self.vtx_info_map.remove(&vertex) {
            for track in info.track_links {
                self.tracks_at_vertices.remove(&(track, vertex));
            }
        }

        self.vertices
            .get_mut(vertex.0)
            .and_then(Option::take)
            .ok_or(VertexingError::VertexNotFound(vertex))
    }
}
