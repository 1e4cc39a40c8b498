//! Core value types shared across the crate

use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Network selector: controls every version byte used in serialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn is_testnet(self) -> bool {
        self == Network::Testnet
    }

    pub fn p2pkh_version(self) -> u8 {
        match self {
            Network::Mainnet => P2PKH_MAINNET_VERSION,
            Network::Testnet => P2PKH_TESTNET_VERSION,
        }
    }

    pub fn p2sh_version(self) -> u8 {
        match self {
            Network::Mainnet => P2SH_MAINNET_VERSION,
            Network::Testnet => P2SH_TESTNET_VERSION,
        }
    }

    pub fn wif_version(self) -> u8 {
        match self {
            Network::Mainnet => WIF_MAINNET_VERSION,
            Network::Testnet => WIF_TESTNET_VERSION,
        }
    }

    pub fn xprv_version(self) -> u32 {
        match self {
            Network::Mainnet => XPRV_MAINNET_VERSION,
            Network::Testnet => XPRV_TESTNET_VERSION,
        }
    }

    pub fn xpub_version(self) -> u32 {
        match self {
            Network::Mainnet => XPUB_MAINNET_VERSION,
            Network::Testnet => XPUB_TESTNET_VERSION,
        }
    }

    pub fn from_wif_version(version: u8) -> Option<Network> {
        match version {
            WIF_MAINNET_VERSION => Some(Network::Mainnet),
            WIF_TESTNET_VERSION => Some(Network::Testnet),
            _ => None,
        }
    }
}

/// Kind of a Base58Check address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    P2pkh,
    P2sh,
}

impl AddressKind {
    pub fn version(self, network: Network) -> u8 {
        match self {
            AddressKind::P2pkh => network.p2pkh_version(),
            AddressKind::P2sh => network.p2sh_version(),
        }
    }

    /// Inverse of [`AddressKind::version`].
    pub fn from_version(version: u8) -> Option<(AddressKind, Network)> {
        match version {
            P2PKH_MAINNET_VERSION => Some((AddressKind::P2pkh, Network::Mainnet)),
            P2PKH_TESTNET_VERSION => Some((AddressKind::P2pkh, Network::Testnet)),
            P2SH_MAINNET_VERSION => Some((AddressKind::P2sh, Network::Mainnet)),
            P2SH_TESTNET_VERSION => Some((AddressKind::P2sh, Network::Testnet)),
            _ => None,
        }
    }
}
