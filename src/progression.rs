//! Progression orders and their axis decomposition.

/// The order in which packets are interleaved within a tile (Table A.16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProgressionOrder {
    /// Layer-resolution-component-position.
    Lrcp,
    /// Resolution-layer-component-position.
    Rlcp,
    /// Resolution-position-component-layer.
    Rpcl,
    /// Position-component-resolution-layer.
    Pcrl,
    /// Component-position-resolution-layer.
    Cprl,
    /// A progression order not defined by Table A.16.
    #[default]
    Unknown,
}

/// One axis of a progression order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// The quality layer axis (`L`).
    Layer,
    /// The resolution level axis (`R`).
    Resolution,
    /// The component axis (`C`).
    Component,
    /// The position axis (`P`), precinct index or spatial coordinate.
    Position,
}

impl ProgressionOrder {
    /// Parses the progression order field of a COD or POC marker segment.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Lrcp),
            1 => Some(Self::Rlcp),
            2 => Some(Self::Rpcl),
            3 => Some(Self::Pcrl),
            4 => Some(Self::Cprl),
            _ => None,
        }
    }

    /// The four axes from most to least significant, or `None` for
    /// [`ProgressionOrder::Unknown`].
    pub fn axes(self) -> Option<[Axis; 4]> {
        use Axis::*;

        match self {
            Self::Lrcp => Some([Layer, Resolution, Component, Position]),
            Self::Rlcp => Some([Resolution, Layer, Component, Position]),
            Self::Rpcl => Some([Resolution, Position, Component, Layer]),
            Self::Pcrl => Some([Position, Component, Resolution, Layer]),
            Self::Cprl => Some([Component, Position, Resolution, Layer]),
            Self::Unknown => None,
        }
    }

    /// Whether the position axis iterates spatial coordinates rather than
    /// precinct indices.
    pub(crate) fn is_spatial(self) -> bool {
        matches!(self, Self::Rpcl | Self::Pcrl | Self::Cprl)
    }
}
