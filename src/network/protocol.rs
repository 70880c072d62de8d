//! Protocol-specific tables: well-known services and UDP probe payloads

use crate::network::Protocol;
use once_cell::sync::Lazy;
use std::collections::HashMap;

static TCP_SERVICES: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (7, "echo"),
        (20, "ftp-data"),
        (21, "ftp"),
        (22, "ssh"),
        (23, "telnet"),
        (25, "smtp"),
        (37, "time"),
        (43, "whois"),
        (53, "domain"),
        (70, "gopher"),
        (79, "finger"),
        (80, "http"),
        (81, "hosts2-ns"),
        (88, "kerberos-sec"),
        (106, "pop3pw"),
        (110, "pop3"),
        (111, "rpcbind"),
        (113, "ident"),
        (119, "nntp"),
        (135, "msrpc"),
        (139, "netbios-ssn"),
        (143, "imap"),
        (179, "bgp"),
        (199, "smux"),
        (389, "ldap"),
        (427, "svrloc"),
        (443, "https"),
        (444, "snpp"),
        (445, "microsoft-ds"),
        (465, "smtps"),
        (513, "login"),
        (514, "shell"),
        (515, "printer"),
        (543, "klogin"),
        (544, "kshell"),
        (548, "afp"),
        (554, "rtsp"),
        (587, "submission"),
        (631, "ipp"),
        (636, "ldapssl"),
        (646, "ldp"),
        (873, "rsync"),
        (990, "ftps"),
        (993, "imaps"),
        (995, "pop3s"),
        (1025, "NFS-or-IIS"),
        (1080, "socks"),
        (1433, "ms-sql-s"),
        (1521, "oracle"),
        (1723, "pptp"),
        (1883, "mqtt"),
        (2049, "nfs"),
        (2121, "ccproxy-ftp"),
        (2375, "docker"),
        (3000, "ppp"),
        (3128, "squid-http"),
        (3306, "mysql"),
        (3389, "ms-wbt-server"),
        (3690, "svn"),
        (4444, "krb524"),
        (5000, "upnp"),
        (5060, "sip"),
        (5432, "postgresql"),
        (5672, "amqp"),
        (5900, "vnc"),
        (5984, "couchdb"),
        (6000, "X11"),
        (6379, "redis"),
        (6667, "irc"),
        (8000, "http-alt"),
        (8008, "http"),
        (8080, "http-proxy"),
        (8081, "blackice-icecap"),
        (8443, "https-alt"),
        (8888, "sun-answerbook"),
        (9000, "cslistener"),
        (9090, "zeus-admin"),
        (9100, "jetdirect"),
        (9200, "wap-wsp"),
        (9418, "git"),
        (10000, "snet-sensor-mgmt"),
        (11211, "memcache"),
        (27017, "mongod"),
    ])
});

static UDP_SERVICES: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (7, "echo"),
        (53, "domain"),
        (67, "dhcps"),
        (68, "dhcpc"),
        (69, "tftp"),
        (111, "rpcbind"),
        (123, "ntp"),
        (135, "msrpc"),
        (137, "netbios-ns"),
        (138, "netbios-dgm"),
        (139, "netbios-ssn"),
        (161, "snmp"),
        (162, "snmptrap"),
        (445, "microsoft-ds"),
        (500, "isakmp"),
        (514, "syslog"),
        (520, "route"),
        (631, "ipp"),
        (1194, "openvpn"),
        (1434, "ms-sql-m"),
        (1900, "upnp"),
        (4500, "nat-t-ike"),
        (5060, "sip"),
        (5353, "zeroconf"),
        (11211, "memcache"),
    ])
});

/// Static port-to-service lookup used for advisory service hints
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceDatabase;

impl ServiceDatabase {
    pub fn new() -> Self {
        Self
    }

    pub fn get_tcp_service(&self, port: u16) -> Option<&'static str> {
        TCP_SERVICES.get(&port).copied()
    }

    pub fn get_udp_service(&self, port: u16) -> Option<&'static str> {
        UDP_SERVICES.get(&port).copied()
    }

    pub fn lookup(&self, port: u16, protocol: Protocol) -> Option<&'static str> {
        match protocol {
            Protocol::Tcp => self.get_tcp_service(port),
            Protocol::Udp => self.get_udp_service(port),
        }
    }
}

static UDP_PAYLOADS: Lazy<HashMap<u16, &'static [u8]>> = Lazy::new(|| {
    let mut payloads: HashMap<u16, &'static [u8]> = HashMap::new();

    // DNS: standard query for "example.com" A
    payloads.insert(53, &[
        0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x07, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 0x03, b'c', b'o', b'm',
        0x00, 0x00, 0x01, 0x00, 0x01,
    ]);

    // TFTP read request
    payloads.insert(69, b"\x00\x01test\x00octet\x00");

    // NTP v4 client request
    payloads.insert(123, &[
        0x23, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ]);

    // NetBIOS name service: wildcard status query
    payloads.insert(137, &[
        0x80, 0xf0, 0x00, 0x10, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x20, 0x43, 0x4b, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41,
        0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41,
        0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x00, 0x00, 0x21,
        0x00, 0x01,
    ]);

    // SNMPv1 get-request, community "public", sysDescr.0 (1.3.6.1.2.1.1.1.0)
    payloads.insert(161, &[
        0x30, 0x29, 0x02, 0x01, 0x00, 0x04, 0x06, b'p', b'u', b'b', b'l', b'i', b'c',
        0xa0, 0x1c, 0x02, 0x04, 0x12, 0x34, 0x56, 0x78, 0x02, 0x01, 0x00, 0x02, 0x01,
        0x00, 0x30, 0x0e, 0x30, 0x0c, 0x06, 0x08, 0x2b, 0x06, 0x01, 0x02, 0x01, 0x01,
        0x01, 0x00, 0x05, 0x00,
    ]);

    // SSDP discovery
    payloads.insert(1900, b"M-SEARCH * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\nMAN: \"ssdp:discover\"\r\nMX: 1\r\nST: ssdp:all\r\n\r\n");

    payloads.insert(5060, b"OPTIONS sip:nm SIP/2.0\r\nVia: SIP/2.0/UDP nm;branch=foo\r\nFrom: <sip:nm@nm>;tag=root\r\nTo: <sip:nm2@nm2>\r\nCall-ID: 50000\r\nCSeq: 42 OPTIONS\r\nMax-Forwards: 70\r\nContent-Length: 0\r\n\r\n");

    // memcached "stats" over the UDP frame header
    payloads.insert(11211, b"\x00\x01\x00\x00\x00\x01\x00\x00stats\r\n");

    payloads
});

/// Probe payload for a UDP port: a protocol-appropriate request for
/// well-known services, an empty datagram otherwise.
pub fn udp_payload(port: u16) -> &'static [u8] {
    UDP_PAYLOADS.get(&port).copied().unwrap_or(&[])
}
