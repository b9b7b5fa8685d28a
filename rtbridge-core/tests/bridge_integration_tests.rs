//! Integration tests for the bridge over loopback UDP.
//!
//! A plain std socket plays the radio unit; the scheduler, endpoint and
//! hardware agent are driven through their public API only.

use std::net::UdpSocket;
use std::time::Duration;

use bytes::Bytes;
use rtbridge_core::agent::{AreaShape, GeoArea, TransportType};
use rtbridge_core::wire::{Destination, ItsAid, PacketTransport, PacketType, Shape};
use rtbridge_core::{
    AgentConfig, BridgeConfig, DataIndicationHeader, DataRequestHeader, EntityId, EventPayload,
    HardwareAgent, NetworkIndication, PortTable, RealTimeScheduler, SchedulerError, SimTime,
};

#[derive(Debug, Clone, PartialEq)]
enum TestEvent {
    Tick,
}

/// Loopback radio unit plus one bridged entity.
struct BridgeFixture {
    hardware: UdpSocket,
    scheduler: RealTimeScheduler<TestEvent>,
    agent: HardwareAgent,
}

impl BridgeFixture {
    fn new() -> Self {
        let hardware = UdpSocket::bind("127.0.0.1:0").unwrap();
        hardware
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let config = BridgeConfig::for_testing();
        let mut scheduler = RealTimeScheduler::new(config.scheduler).unwrap();
        let agent_config = AgentConfig {
            remote_addr: hardware.local_addr().unwrap(),
            use_port_classification: true,
            ..config.agent
        };
        let agent = HardwareAgent::initialize(
            &mut scheduler,
            EntityId::new(1),
            &agent_config,
            Some(PortTable::well_known()),
        )
        .unwrap();

        Self {
            hardware,
            scheduler,
            agent,
        }
    }

    fn send_indication(&self, header: &DataIndicationHeader, payload: &[u8]) {
        let mut datagram = header.serialize().to_vec();
        datagram.extend_from_slice(payload);
        self.hardware
            .send_to(&datagram, self.agent.endpoint().local_addr())
            .unwrap();
    }

    fn teardown(self) -> RealTimeScheduler<TestEvent> {
        let mut scheduler = self.scheduler;
        self.agent.teardown(&mut scheduler);
        scheduler
    }
}

#[test]
fn test_hardware_indication_reaches_entity_before_distant_tick() {
    let mut fixture = BridgeFixture::new();
    fixture.scheduler.start_run();
    fixture
        .scheduler
        .schedule(SimTime::from_millis(400), EntityId::new(1), TestEvent::Tick)
        .unwrap();

    let header = DataIndicationHeader {
        packet_type: PacketType::BtpB,
        transport: PacketTransport::SingleHopBroadcast,
        destination_port: 2001,
        destination: Destination::circle(485_000_000, 92_500_000, 300, 0),
        its_aid: ItsAid::Cam,
        data_length: 4,
        ..Default::default()
    };
    fixture.send_indication(&header, b"\x02\x02\x00\x01");

    let event = fixture.scheduler.take_next_event().unwrap().unwrap();
    assert_eq!(event.destination(), EntityId::new(1));
    assert!(event.arrival() < SimTime::from_millis(400));

    let EventPayload::Datagram(datagram) = event.payload() else {
        panic!("expected a hardware datagram first");
    };
    let packet = fixture.agent.handle_datagram(datagram).unwrap();
    assert_eq!(packet.request.transport, TransportType::Shb);
    assert_eq!(packet.request.its_aid, ItsAid::Cam);
    assert_eq!(
        packet.request.area.map(|area| area.shape),
        Some(AreaShape::Circle { radius: 300 })
    );
    assert_eq!(packet.payload, Bytes::from_static(b"\x02\x02\x00\x01"));

    let event = fixture.scheduler.take_next_event().unwrap().unwrap();
    assert_eq!(event.payload(), &EventPayload::Simulation(TestEvent::Tick));
    assert_eq!(fixture.scheduler.current_time(), SimTime::from_millis(400));

    let mut scheduler = fixture.teardown();
    assert!(matches!(
        scheduler.take_next_event(),
        Err(SchedulerError::QueueExhausted { .. })
    ));
}

#[test]
fn test_malformed_indication_is_dropped_by_agent() {
    let mut fixture = BridgeFixture::new();
    fixture.scheduler.start_run();

    fixture
        .hardware
        .send_to(&[0xFF; 12], fixture.agent.endpoint().local_addr())
        .unwrap();

    let event = fixture.scheduler.take_next_event().unwrap().unwrap();
    let EventPayload::Datagram(datagram) = event.payload() else {
        panic!("expected a hardware datagram");
    };
    assert_eq!(datagram.len(), 12);
    assert!(fixture.agent.handle_datagram(datagram).is_none());
    fixture.teardown();
}

#[test]
fn test_forwarded_rectangle_request_on_the_wire() {
    let fixture = BridgeFixture::new();
    let indication = NetworkIndication {
        its_aid: None,
        traffic_class: 0x01,
        remaining_lifetime: Some(Duration::from_secs(60)),
        destination_port: 2002,
        destination_port_info: Some(7),
        area: Some(GeoArea {
            latitude: -33.75,
            longitude: 151.25,
            angle: 90,
            shape: AreaShape::Rectangle { a: 100, b: 50 },
        }),
        permissions: None,
    };

    fixture.agent.forward(&indication, b"denm").unwrap();

    let mut buffer = [0u8; 256];
    let (len, _) = fixture.hardware.recv_from(&mut buffer).unwrap();
    assert_eq!(len, DataRequestHeader::SIZE + 4);
    assert_eq!(buffer[22], u8::from(Shape::Rectangle));

    let header = DataRequestHeader::deserialize(&buffer[..DataRequestHeader::SIZE]).unwrap();
    assert_eq!(header.its_aid, ItsAid::Denm);
    assert_eq!(header.transport, PacketTransport::GeoBroadcast);
    assert_eq!(header.destination_port_info, 7);
    assert_eq!(header.destination.latitude, -337_500_000);
    assert_eq!(header.destination.longitude, 1_512_500_000);
    assert_eq!((header.destination.distance_a, header.destination.distance_b), (100, 50));
    assert_eq!(&buffer[DataRequestHeader::SIZE..len], b"denm");

    let json = serde_json::to_value(&header).unwrap();
    assert_eq!(json["its_aid"], "Denm");
    assert_eq!(json["data_length"], 4);

    fixture.teardown();
}
