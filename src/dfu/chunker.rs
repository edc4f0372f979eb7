//! Splits a firmware image into fixed-size packets with receipt-interval
//! bookkeeping.
//!
//! The chunker owns the flow-control arithmetic: how many packets may go
//! out before the bootloader must acknowledge, how many bytes the last
//! packet carries, and when the final packet has been handed out.

use super::config::PACKET_SIZE;

/// One firmware-data write. The last packet of the image is marked so the
/// caller knows when to expect the transfer-complete response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwarePacket {
    Data(Vec<u8>),
    Last(Vec<u8>),
}

impl FirmwarePacket {
    pub fn bytes(&self) -> &[u8] {
        match self {
            FirmwarePacket::Data(b) | FirmwarePacket::Last(b) => b,
        }
    }

    pub fn is_last(&self) -> bool {
        matches!(self, FirmwarePacket::Last(_))
    }
}

/// Stateful packet source for one firmware image.
#[derive(Debug)]
pub struct FirmwareChunker {
    data: Vec<u8>,
    packet_size: usize,
    receipt_interval: u16,
    /// Index of the next packet to hand out.
    next_packet: usize,
    bytes_sent: usize,
    /// Packets sent since the last receipt notification.
    unacknowledged: u16,
}

impl FirmwareChunker {
    /// `receipt_interval` of 0 disables receipt boundaries entirely.
    pub fn new(data: Vec<u8>, receipt_interval: u16) -> Self {
        Self::with_packet_size(data, PACKET_SIZE, receipt_interval)
    }

    pub fn with_packet_size(data: Vec<u8>, packet_size: usize, receipt_interval: u16) -> Self {
        debug_assert!(packet_size > 0);
        Self {
            data,
            packet_size,
            receipt_interval,
            next_packet: 0,
            bytes_sent: 0,
            unacknowledged: 0,
        }
    }

    /// Total number of packets the image divides into.
    pub fn packet_count(&self) -> usize {
        self.data.len().div_ceil(self.packet_size)
    }

    /// Size of the final packet. Equals the packet size when the image is
    /// an exact multiple.
    pub fn bytes_in_last_packet(&self) -> usize {
        match self.data.len() % self.packet_size {
            0 if !self.data.is_empty() => self.packet_size,
            rem => rem,
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    pub fn all_sent(&self) -> bool {
        self.next_packet >= self.packet_count()
    }

    /// Hand out the next packet, or `None` once the image is exhausted.
    pub fn next_packet(&mut self) -> Option<FirmwarePacket> {
        if self.all_sent() {
            return None;
        }
        let start = self.next_packet * self.packet_size;
        let end = (start + self.packet_size).min(self.data.len());
        let bytes = self.data[start..end].to_vec();

        self.next_packet += 1;
        self.bytes_sent = end;
        self.unacknowledged += 1;

        if self.all_sent() {
            Some(FirmwarePacket::Last(bytes))
        } else {
            Some(FirmwarePacket::Data(bytes))
        }
    }

    /// Whether sending must pause for a receipt notification.
    pub fn at_receipt_boundary(&self) -> bool {
        self.receipt_interval != 0 && self.unacknowledged >= self.receipt_interval && !self.all_sent()
    }

    /// Record a receipt notification, reopening the send window.
    pub fn acknowledge(&mut self) {
        self.unacknowledged = 0;
    }

    /// Transfer progress in percent.
    pub fn percent(&self) -> u8 {
        if self.data.is_empty() {
            return 100;
        }
        ((self.bytes_sent * 100) / self.data.len()) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_1050_bytes_yields_53_packets_last_of_10() {
        let mut chunker = FirmwareChunker::new(vec![0xAB; 1050], 0);
        assert_eq!(chunker.packet_count(), 53);
        assert_eq!(chunker.bytes_in_last_packet(), 10);

        let mut last_seen = 0;
        for i in 1..=53 {
            let packet = chunker.next_packet().unwrap();
            if packet.is_last() {
                last_seen += 1;
                assert_eq!(i, 53);
                assert_eq!(packet.bytes().len(), 10);
            } else {
                assert_eq!(packet.bytes().len(), 20);
            }
        }
        assert_eq!(last_seen, 1);
        assert!(chunker.all_sent());
        assert_eq!(chunker.next_packet(), None);
    }

    #[test]
    fn test_exact_multiple_last_packet_is_full() {
        let chunker = FirmwareChunker::new(vec![0u8; 100], 0);
        assert_eq!(chunker.packet_count(), 5);
        assert_eq!(chunker.bytes_in_last_packet(), 20);
    }

    #[test]
    fn test_receipt_boundary_every_interval() {
        let mut chunker = FirmwareChunker::new(vec![0u8; 1050], 10);

        for _ in 0..10 {
            assert!(!chunker.at_receipt_boundary());
            chunker.next_packet().unwrap();
        }
        assert!(chunker.at_receipt_boundary());
        assert!(chunker.next_packet().is_some()); // caller decides when to stop

        chunker.acknowledge();
        assert!(!chunker.at_receipt_boundary());
    }

    #[test]
    fn test_no_boundary_when_disabled() {
        let mut chunker = FirmwareChunker::new(vec![0u8; 1050], 0);
        for _ in 0..53 {
            assert!(!chunker.at_receipt_boundary());
            chunker.next_packet();
        }
    }

    #[test]
    fn test_no_boundary_after_final_packet() {
        // 40 bytes, interval 2: the boundary after packet 2 coincides with
        // the end of the image and must not stall completion.
        let mut chunker = FirmwareChunker::new(vec![0u8; 40], 2);
        chunker.next_packet().unwrap();
        chunker.next_packet().unwrap();
        assert!(chunker.all_sent());
        assert!(!chunker.at_receipt_boundary());
    }

    #[test]
    fn test_progress_tracking() {
        let mut chunker = FirmwareChunker::new(vec![0u8; 200], 0);
        assert_eq!(chunker.percent(), 0);
        for _ in 0..5 {
            chunker.next_packet();
        }
        assert_eq!(chunker.bytes_sent(), 100);
        assert_eq!(chunker.percent(), 50);
        while chunker.next_packet().is_some() {}
        assert_eq!(chunker.percent(), 100);
    }
}
