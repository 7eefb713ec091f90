//! Fargate task sizes.
//!
//! Fargate only accepts specific (CPU, memory) pairs. Each CPU tier supports
//! a fixed set of memory values; the smallest one is the tier's default.

use std::fmt;

use serde::{Serialize, Serializer};

use super::error::ConfigurationError;
use super::units::{format_scaled, parse_gb, parse_vcpu};

/// CPU in units of 1/1024 vCPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cpu(pub u32);

/// Memory in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Memory(pub u32);

/// Ephemeral task storage in GiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Storage(pub u32);

pub const DEFAULT_CPU: Cpu = Cpu(256);
pub const DEFAULT_STORAGE: Storage = Storage(20);
pub const MIN_STORAGE_GB: u32 = 20;
pub const MAX_STORAGE_GB: u32 = 200;

impl Cpu {
    pub fn parse(raw: &str) -> Result<Self, ConfigurationError> {
        parse_vcpu(raw).map(Cpu)
    }

    pub fn units(&self) -> u32 {
        self.0
    }
}

impl Memory {
    pub fn parse(raw: &str) -> Result<Self, ConfigurationError> {
        parse_gb(raw).map(Memory)
    }

    pub fn mib(&self) -> u32 {
        self.0
    }
}

impl Storage {
    pub fn parse(raw: &str) -> Result<Self, ConfigurationError> {
        let mib = parse_gb(raw).map_err(|_| ConfigurationError::InvalidStorage(raw.to_string()))?;
        if mib % 1024 != 0 {
            return Err(ConfigurationError::InvalidStorage(raw.to_string()));
        }
        let gb = mib / 1024;
        if !(MIN_STORAGE_GB..=MAX_STORAGE_GB).contains(&gb) {
            return Err(ConfigurationError::InvalidStorage(raw.to_string()));
        }
        Ok(Storage(gb))
    }

    pub fn gib(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vCPU", format_scaled(self.0))
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} GB", format_scaled(self.0))
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} GB", self.0)
    }
}

macro_rules! serialize_as_display {
    ($($ty:ty),*) => {
        $(
            impl Serialize for $ty {
                fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    serializer.collect_str(self)
                }
            }
        )*
    };
}

serialize_as_display!(Cpu, Memory, Storage);

/// Memory values a CPU tier accepts, in MiB.
#[derive(Debug, Clone, Copy)]
enum MemoryOptions {
    List(&'static [u32]),
    Range { min: u32, max: u32, step: u32 },
}

impl MemoryOptions {
    fn values(&self) -> Vec<u32> {
        match *self {
            MemoryOptions::List(values) => values.to_vec(),
            MemoryOptions::Range { min, max, step } => (min..=max).step_by(step as usize).collect(),
        }
    }

    fn contains(&self, mib: u32) -> bool {
        match *self {
            MemoryOptions::List(values) => values.contains(&mib),
            MemoryOptions::Range { min, max, step } => {
                (min..=max).contains(&mib) && (mib - min) % step == 0
            }
        }
    }

    fn default_value(&self) -> u32 {
        match *self {
            MemoryOptions::List(values) => values[0],
            MemoryOptions::Range { min, .. } => min,
        }
    }
}

const GB: u32 = 1024;

const CPU_TIERS: [(u32, MemoryOptions); 7] = [
    (256, MemoryOptions::List(&[512, 1024, 2048])),
    (512, MemoryOptions::Range { min: GB, max: 4 * GB, step: GB }),
    (1024, MemoryOptions::Range { min: 2 * GB, max: 8 * GB, step: GB }),
    (2048, MemoryOptions::Range { min: 4 * GB, max: 16 * GB, step: GB }),
    (4096, MemoryOptions::Range { min: 8 * GB, max: 30 * GB, step: GB }),
    (8192, MemoryOptions::Range { min: 16 * GB, max: 60 * GB, step: 4 * GB }),
    (16384, MemoryOptions::Range { min: 32 * GB, max: 120 * GB, step: 8 * GB }),
];

fn tier_for(cpu: Cpu) -> Option<MemoryOptions> {
    CPU_TIERS
        .iter()
        .find(|(units, _)| *units == cpu.units())
        .map(|(_, options)| *options)
}

/// All supported CPU values, for error messages.
pub fn supported_cpus() -> Vec<Cpu> {
    CPU_TIERS.iter().map(|(units, _)| Cpu(*units)).collect()
}

/// All memory values supported by a CPU tier, or `None` when the CPU is not a tier.
pub fn supported_memories(cpu: Cpu) -> Option<Vec<Memory>> {
    tier_for(cpu).map(|options| options.values().into_iter().map(Memory).collect())
}

/// Check whether a (CPU, memory) pair is one Fargate accepts.
pub fn is_supported(cpu: Cpu, memory: Memory) -> bool {
    tier_for(cpu)
        .map(|options| options.contains(memory.mib()))
        .unwrap_or(false)
}

fn join_display<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve the task size from the user's `cpu` and `memory` fields.
///
/// Without `cpu` the smallest tier is used. Without `memory` the tier's default
/// memory is selected. An explicit memory must belong to the tier.
pub fn resolve_size(
    cpu: Option<&str>,
    memory: Option<&str>,
) -> Result<(Cpu, Memory), ConfigurationError> {
    let cpu = match cpu {
        Some(raw) => Cpu::parse(raw)?,
        None => DEFAULT_CPU,
    };

    let options = tier_for(cpu).ok_or_else(|| {
        ConfigurationError::UnsupportedCpu(cpu.to_string(), join_display(&supported_cpus()))
    })?;

    let memory = match memory {
        Some(raw) => Memory::parse(raw)?,
        None => Memory(options.default_value()),
    };

    if !options.contains(memory.mib()) {
        let supported: Vec<Memory> = options.values().into_iter().map(Memory).collect();
        return Err(ConfigurationError::InvalidSizeCombination {
            cpu: cpu.to_string(),
            memory: memory.to_string(),
            supported: join_display(&supported),
        });
    }

    Ok((cpu, memory))
}

pub fn resolve_storage(storage: Option<&str>) -> Result<Storage, ConfigurationError> {
    storage.map(Storage::parse).unwrap_or(Ok(DEFAULT_STORAGE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let (cpu, memory) = resolve_size(None, None).unwrap();
        assert_eq!(cpu.to_string(), "0.25 vCPU");
        assert_eq!(memory.to_string(), "0.5 GB");
    }

    #[test]
    fn test_tier_default_memory() {
        let (_, memory) = resolve_size(Some("4 vCPU"), None).unwrap();
        assert_eq!(memory, Memory(8 * 1024));
    }

    #[test]
    fn test_one_vcpu_four_gb_accepted() {
        let (cpu, memory) = resolve_size(Some("1 vCPU"), Some("4 GB")).unwrap();
        assert_eq!(cpu, Cpu(1024));
        assert_eq!(memory, Memory(4096));
    }

    #[test]
    fn test_one_vcpu_twenty_gb_rejected() {
        let result = resolve_size(Some("1 vCPU"), Some("20 GB"));
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidSizeCombination { .. })
        ));
    }

    #[test]
    fn test_unsupported_cpu() {
        let result = resolve_size(Some("3 vCPU"), None);
        assert!(matches!(result, Err(ConfigurationError::UnsupportedCpu(_, _))));
    }

    #[test]
    fn test_every_supported_pair_round_trips() {
        for cpu in supported_cpus() {
            for memory in supported_memories(cpu).unwrap() {
                let cpu_str = cpu.to_string();
                let memory_str = memory.to_string();
                let (resolved_cpu, resolved_memory) =
                    resolve_size(Some(&cpu_str), Some(&memory_str)).unwrap();
                assert_eq!(resolved_cpu.to_string(), cpu_str);
                assert_eq!(resolved_memory.to_string(), memory_str);
            }
        }
    }

    #[test]
    fn test_unsupported_pairs_rejected() {
        for cpu in supported_cpus() {
            for gb in 1..=128u32 {
                let memory = Memory(gb * 1024);
                if is_supported(cpu, memory) {
                    continue;
                }
                let result = resolve_size(Some(&cpu.to_string()), Some(&memory.to_string()));
                assert!(matches!(
                    result,
                    Err(ConfigurationError::InvalidSizeCombination { .. })
                ));
            }
        }
    }

    #[test]
    fn test_large_tier_steps() {
        assert!(is_supported(Cpu(8192), Memory(20 * 1024)));
        assert!(!is_supported(Cpu(8192), Memory(18 * 1024)));
        assert!(is_supported(Cpu(16384), Memory(120 * 1024)));
        assert!(!is_supported(Cpu(16384), Memory(36 * 1024)));
    }

    #[test]
    fn test_storage() {
        assert_eq!(resolve_storage(None), Ok(Storage(20)));
        assert_eq!(resolve_storage(Some("100 GB")), Ok(Storage(100)));
        assert!(matches!(
            resolve_storage(Some("10 GB")),
            Err(ConfigurationError::InvalidStorage(_))
        ));
        assert!(resolve_storage(Some("201 GB")).is_err());
    }
}
