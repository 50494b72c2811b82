// Hearth - hardware-agnostic rendering core
//
// gfx:     capability traits, backend-independent policy (negotiation,
//          device scoring, queue families, command buffer pooling)
// backend: the Vulkan implementation of those traits
// core:    ownership handle, window and application shell

pub mod backend;
pub mod config;
pub mod core;
pub mod gfx;
