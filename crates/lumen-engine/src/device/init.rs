/// Initialization parameters for a [`super::WgpuDevice`].
///
/// Keep this structure stable and minimal. Add configuration flags only when a
/// concrete platform or backend requirement exists.
#[derive(Debug, Clone)]
pub struct DeviceInit {
    /// Adapter preference.
    ///
    /// Buffer tooling is rarely GPU-bound; low power avoids waking a discrete GPU.
    pub power_preference: wgpu::PowerPreference,

    /// Allow a software (fallback) adapter.
    pub force_fallback_adapter: bool,

    /// Required wgpu features.
    ///
    /// Favor an empty set for portability unless a feature is strictly necessary.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,

    /// Debug label attached to the logical device.
    pub label: String,
}

impl Default for DeviceInit {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::LowPower,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            label: "lumen device".to_owned(),
        }
    }
}
