// src/module/options.rs

//! Option and settings flag sets for module operations

bitflags::bitflags! {
    /// Options for starting a module
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StartOptions: u8 {
        /// The start is transient: the persistent auto-start and
        /// activation-policy settings of the module are not modified
        const TRANSIENT = 1 << 0;
        /// Activate the module according to its declared activation policy
        const USE_ACTIVATION_POLICY = 1 << 1;
        /// The start is transient and the persisted activation policy
        /// should be used
        const TRANSIENT_RESUME = 1 << 2;
        /// The module is being started because of a lazy start trigger.
        /// Must be combined with [`StartOptions::TRANSIENT`]
        const LAZY_TRIGGER = 1 << 3;
    }

    /// Options for stopping a module
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StopOptions: u8 {
        /// The stop is transient: the persistent auto-start setting of the
        /// module is not modified
        const TRANSIENT = 1 << 0;
    }

    /// Persistent settings for a module
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Settings: u8 {
        /// The module has been set to auto start
        const AUTO_START = 1 << 0;
        /// The module has been set to use its activation policy
        const USE_ACTIVATION_POLICY = 1 << 1;
    }
}
