//! Parallel particle store: one strided column per channel, shared particle index
//!
//! Every channel is sized `capacity * stride` and particle `i` lives at
//! `data[i * stride..(i + 1) * stride]` in all of them. Killing a particle
//! swap-removes it with the last live one, so `[0, size)` stays dense.

use crate::channels::{initializer_for, ChannelDescriptor, ElementType, ScratchShape};
use ember_core::{ChannelId, EmberError, Result};
use std::any::Any;
use std::fmt;

/// One slot of an object channel
pub type ObjectSlot = Option<Box<dyn Any>>;

/// Resolved reference to a channel inside one store.
///
/// Handles are only meaningful for the store that produced them; a controller
/// re-resolves all of them whenever it rebuilds its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: ChannelId,
    pub stride: usize,
    index: usize,
}

enum ChannelData {
    Float(Vec<f32>),
    Object(Vec<ObjectSlot>),
}

struct Channel {
    descriptor: ChannelDescriptor,
    data: ChannelData,
    initializer: Option<&'static [f32]>,
}

impl Channel {
    fn allocate(descriptor: ChannelDescriptor, capacity: usize) -> Self {
        let initializer = initializer_for(&descriptor);
        let data = match descriptor.element {
            ElementType::Float => {
                let mut data = vec![0.0; capacity * descriptor.stride];
                if let Some(pattern) = initializer {
                    fill_pattern(&mut data, pattern);
                }
                ChannelData::Float(data)
            }
            ElementType::Object => {
                ChannelData::Object(std::iter::repeat_with(|| None).take(capacity).collect())
            }
        };
        Self {
            descriptor,
            data,
            initializer,
        }
    }

    fn set_capacity(&mut self, capacity: usize) {
        let stride = self.descriptor.stride;
        match &mut self.data {
            ChannelData::Float(data) => {
                let old_len = data.len();
                data.resize(capacity * stride, 0.0);
                data.shrink_to_fit();
                if let Some(pattern) = self.initializer {
                    if data.len() > old_len {
                        fill_pattern(&mut data[old_len..], pattern);
                    }
                }
            }
            ChannelData::Object(data) => {
                data.resize_with(capacity, || None);
                data.shrink_to_fit();
            }
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        match &mut self.data {
            ChannelData::Float(data) => {
                let stride = self.descriptor.stride;
                let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                let (head, tail) = data.split_at_mut(hi * stride);
                head[lo * stride..(lo + 1) * stride].swap_with_slice(&mut tail[..stride]);
            }
            ChannelData::Object(data) => data.swap(a, b),
        }
    }
}

fn fill_pattern(data: &mut [f32], pattern: &[f32]) {
    for chunk in data.chunks_exact_mut(pattern.len()) {
        chunk.copy_from_slice(pattern);
    }
}

/// Struct-of-arrays particle container.
pub struct ParticleStore {
    channels: Vec<Channel>,
    capacity: usize,
    size: usize,
    next_scratch: u32,
}

impl ParticleStore {
    /// Create an empty store with room for `capacity` particles and no channels.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Vec::new(),
            capacity,
            size: 0,
            next_scratch: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live particles
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Add a channel, or return the existing one when the id is already present.
    ///
    /// Fails if the id is already registered with a different element type or stride,
    /// or if a permanent id was never handed out by the registry.
    pub fn add_channel(&mut self, descriptor: &ChannelDescriptor) -> Result<ChannelHandle> {
        if let Some(handle) = self.lookup_channel(descriptor)? {
            return Ok(handle);
        }
        if !descriptor.id.is_known() && !descriptor.id.is_scratch() {
            return Err(EmberError::InvalidChannelId(descriptor.to_string()));
        }
        if descriptor.stride == 0 {
            return Err(EmberError::InvalidConfig(format!(
                "channel {descriptor} has zero stride"
            )));
        }
        Ok(self.push_channel(*descriptor))
    }

    /// Allocate a fresh scratch channel. Every call yields a new id, so stages that
    /// each need "a pair of floats" never share a column.
    pub fn add_scratch_channel(&mut self, shape: ScratchShape) -> ChannelHandle {
        let id = ChannelId::scratch(self.next_scratch);
        self.next_scratch += 1;
        self.push_channel(ChannelDescriptor::float(id, shape.stride()))
    }

    /// Look up a channel without allocating it. A channel registered under the same
    /// id with another shape is logged and reported as absent; stages resolving
    /// optional channels at setup use [`ParticleStore::lookup_channel`] instead.
    pub fn get_channel(&self, descriptor: &ChannelDescriptor) -> Option<ChannelHandle> {
        match self.lookup_channel(descriptor) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(%err, "channel lookup with mismatched shape");
                None
            }
        }
    }

    /// Look up a channel without allocating it, failing with `ChannelMismatch` when
    /// the id is present with a different element type or stride.
    pub fn lookup_channel(&self, descriptor: &ChannelDescriptor) -> Result<Option<ChannelHandle>> {
        let Some((index, channel)) = self
            .channels
            .iter()
            .enumerate()
            .find(|(_, c)| c.descriptor.id == descriptor.id)
        else {
            return Ok(None);
        };
        if channel.descriptor.element != descriptor.element
            || channel.descriptor.stride != descriptor.stride
        {
            return Err(EmberError::ChannelMismatch {
                id: descriptor.id.to_string(),
                existing: channel.descriptor.shape(),
                requested: descriptor.shape(),
            });
        }
        Ok(Some(ChannelHandle {
            id: descriptor.id,
            stride: descriptor.stride,
            index,
        }))
    }

    fn push_channel(&mut self, descriptor: ChannelDescriptor) -> ChannelHandle {
        let index = self.channels.len();
        self.channels.push(Channel::allocate(descriptor, self.capacity));
        ChannelHandle {
            id: descriptor.id,
            stride: descriptor.stride,
            index,
        }
    }

    fn channel(&self, handle: ChannelHandle) -> Result<&Channel> {
        self.channels
            .get(handle.index)
            .filter(|c| c.descriptor.id == handle.id)
            .ok_or_else(|| EmberError::MissingChannel(handle.id.to_string()))
    }

    fn channel_mut(&mut self, handle: ChannelHandle) -> Result<&mut Channel> {
        self.channels
            .get_mut(handle.index)
            .filter(|c| c.descriptor.id == handle.id)
            .ok_or_else(|| EmberError::MissingChannel(handle.id.to_string()))
    }

    /// Full float column (`capacity * stride` values)
    pub fn floats(&self, handle: ChannelHandle) -> Result<&[f32]> {
        match &self.channel(handle)?.data {
            ChannelData::Float(data) => Ok(data),
            ChannelData::Object(_) => Err(type_error(handle, "float", "object")),
        }
    }

    pub fn floats_mut(&mut self, handle: ChannelHandle) -> Result<&mut [f32]> {
        match &mut self.channel_mut(handle)?.data {
            ChannelData::Float(data) => Ok(data),
            ChannelData::Object(_) => Err(type_error(handle, "float", "object")),
        }
    }

    /// Borrow several distinct float columns mutably at once.
    pub fn floats_many_mut<const N: usize>(
        &mut self,
        handles: [ChannelHandle; N],
    ) -> Result<[&mut [f32]; N]> {
        for (i, a) in handles.iter().enumerate() {
            if handles[i + 1..].iter().any(|b| b.index == a.index) {
                return Err(EmberError::ChannelAliased(a.id.to_string()));
            }
            self.channel(*a)?;
        }
        let mut out: [Option<&mut [f32]>; N] = std::array::from_fn(|_| None);
        for (index, channel) in self.channels.iter_mut().enumerate() {
            let Some(slot) = handles.iter().position(|h| h.index == index) else {
                continue;
            };
            match &mut channel.data {
                ChannelData::Float(data) => out[slot] = Some(data.as_mut_slice()),
                ChannelData::Object(_) => {
                    return Err(type_error(handles[slot], "float", "object"));
                }
            }
        }
        let mut result = Vec::with_capacity(N);
        for (slot, data) in out.into_iter().enumerate() {
            result.push(data.ok_or_else(|| EmberError::MissingChannel(handles[slot].id.to_string()))?);
        }
        result
            .try_into()
            .map_err(|_| EmberError::ChannelAliased(format!("{N} channels")))
    }

    /// Full object column (`capacity` slots)
    pub fn objects(&self, handle: ChannelHandle) -> Result<&[ObjectSlot]> {
        match &self.channel(handle)?.data {
            ChannelData::Object(data) => Ok(data),
            ChannelData::Float(_) => Err(type_error(handle, "object", "float")),
        }
    }

    pub fn objects_mut(&mut self, handle: ChannelHandle) -> Result<&mut [ObjectSlot]> {
        match &mut self.channel_mut(handle)?.data {
            ChannelData::Object(data) => Ok(data),
            ChannelData::Float(_) => Err(type_error(handle, "object", "float")),
        }
    }

    /// Typed mutable access to one object slot. `None` when the slot is empty or
    /// holds another type.
    pub fn object_mut<T: Any>(&mut self, handle: ChannelHandle, particle: usize) -> Result<Option<&mut T>> {
        Ok(self
            .objects_mut(handle)?
            .get_mut(particle)
            .and_then(|slot| slot.as_mut())
            .and_then(|obj| obj.downcast_mut::<T>()))
    }

    /// Reallocate every channel to `capacity` particles in lock-step, keeping
    /// indices `[0, min(size, capacity))`.
    pub fn set_capacity(&mut self, capacity: usize) {
        if capacity == self.capacity {
            return;
        }
        for channel in &mut self.channels {
            channel.set_capacity(capacity);
        }
        self.capacity = capacity;
        self.size = self.size.min(capacity);
    }

    /// Grow (never shrink) so that `required` particles fit.
    pub fn ensure_capacity(&mut self, required: usize) {
        if required > self.capacity {
            let grown = required.max(self.capacity * 2).max(1);
            tracing::warn!(
                from = self.capacity,
                to = grown,
                "particle store grown beyond its configured capacity"
            );
            self.set_capacity(grown);
        }
    }

    /// Mark `count` more slots as live and return the first new index. The caller
    /// is responsible for initializing the new slots.
    pub fn grow_size(&mut self, count: usize) -> usize {
        let start = self.size;
        self.ensure_capacity(start + count);
        self.size += count;
        start
    }

    /// Swap-remove particle `index`: the last live particle takes its slot and the
    /// removed one ends up at the old last index, just past the new `size`.
    pub fn remove_element(&mut self, index: usize) {
        if index >= self.size {
            return;
        }
        let last = self.size - 1;
        if index != last {
            for channel in &mut self.channels {
                channel.swap(index, last);
            }
        }
        self.size = last;
    }

    /// Drop every live particle, keeping channels and capacity.
    pub fn clear_particles(&mut self) {
        self.size = 0;
    }

    /// Drop all channels and particles.
    pub fn clear(&mut self) {
        self.channels.clear();
        self.size = 0;
        self.next_scratch = 0;
    }
}

impl Default for ParticleStore {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for ParticleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleStore")
            .field("capacity", &self.capacity)
            .field("size", &self.size)
            .field(
                "channels",
                &self.channels.iter().map(|c| c.descriptor).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn type_error(handle: ChannelHandle, expected: &str, actual: &str) -> EmberError {
    EmberError::ChannelType {
        id: handle.id.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}
