//! Application classification used when building Data Requests.

use std::collections::HashMap;

use crate::wire::{ItsAid, PacketTransport};

/// Destination-port to application-id lookup for packets that carry no
/// explicit application id.
///
/// Best effort only: well-known BTP ports do not cover every service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortTable {
    entries: HashMap<u16, ItsAid>,
}

impl PortTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Well-known BTP destination ports of the ITS facilities services.
    pub fn well_known() -> Self {
        [
            (2001, ItsAid::Cam),
            (2002, ItsAid::Denm),
            (2003, ItsAid::Map),
            (2004, ItsAid::Spat),
            (2005, ItsAid::Saem),
            (2006, ItsAid::Ivi),
            (2009, ItsAid::Cpm),
        ]
        .into_iter()
        .collect()
    }

    pub fn insert(&mut self, port: u16, aid: ItsAid) -> Option<ItsAid> {
        self.entries.insert(port, aid)
    }

    pub fn lookup(&self, port: u16) -> Option<ItsAid> {
        self.entries.get(&port).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(u16, ItsAid)> for PortTable {
    fn from_iter<I: IntoIterator<Item = (u16, ItsAid)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Packet transport the hardware expects for an application.
///
/// Returns `None` for applications without a known mapping, CPM included.
pub fn transport_for(aid: ItsAid) -> Option<PacketTransport> {
    match aid {
        ItsAid::Cam | ItsAid::Saem => Some(PacketTransport::SingleHopBroadcast),
        ItsAid::Denm | ItsAid::Map | ItsAid::Spat | ItsAid::Ivi => {
            Some(PacketTransport::GeoBroadcast)
        }
        ItsAid::Cpm | ItsAid::Other(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_ports() {
        let table = PortTable::well_known();

        assert_eq!(table.len(), 7);
        assert_eq!(table.lookup(2001), Some(ItsAid::Cam));
        assert_eq!(table.lookup(2005), Some(ItsAid::Saem));
        assert_eq!(table.lookup(2009), Some(ItsAid::Cpm));
        assert_eq!(table.lookup(2007), None);
    }

    #[test]
    fn test_transport_mapping() {
        assert_eq!(
            transport_for(ItsAid::Cam),
            Some(PacketTransport::SingleHopBroadcast)
        );
        assert_eq!(
            transport_for(ItsAid::Ivi),
            Some(PacketTransport::GeoBroadcast)
        );
        assert_eq!(transport_for(ItsAid::Cpm), None);
        assert_eq!(transport_for(ItsAid::Other(0)), None);
    }
}
