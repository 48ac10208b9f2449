//! Shared fixture builders for integration tests.
//!
//! Everything here synthesizes the on-disk formats byte by byte: column
//! artifacts, ABF streams (signature, header page, payloads, virtual
//! directory, backup log), Xpress9 frame streams, zip containers, and a
//! minimal relational catalog.

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;

use rusqlite::Connection;
use tempfile::NamedTempFile;

// ---------------------------------------------------------------------
// Column artifacts
// ---------------------------------------------------------------------

/// Builds an `.idfmeta` blob with the given decoding constants.
pub fn build_idfmeta(
    min_data_id: u32,
    row_count: u64,
    count_bit_packed: u64,
    bit_width: u32,
    distinct_states: u64,
) -> Vec<u8> {
    fn open(buf: &mut Vec<u8>, name: &str) {
        buf.extend_from_slice(b"<1:");
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
    }
    fn close(buf: &mut Vec<u8>, name: &str) {
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b":1>");
        buf.push(0);
    }

    let mut b = Vec::new();
    open(&mut b, "CP");
    b.extend_from_slice(&1u64.to_le_bytes());
    open(&mut b, "CS");
    b.extend_from_slice(&row_count.to_le_bytes());
    b.extend_from_slice(&1u64.to_le_bytes());
    b.extend_from_slice(&36u32.to_le_bytes()); // bit-width base
    b.extend_from_slice(&bit_width.to_le_bytes()); // iterator
    b.extend_from_slice(&0u64.to_le_bytes());
    b.extend_from_slice(&0u64.to_le_bytes());
    b.extend_from_slice(&0u64.to_le_bytes());
    b.push(0);
    b.extend_from_slice(&0u32.to_le_bytes());
    open(&mut b, "SS");
    b.extend_from_slice(&distinct_states.to_le_bytes());
    b.extend_from_slice(&min_data_id.to_le_bytes());
    b.extend_from_slice(&(min_data_id + distinct_states.max(1) as u32 - 1).to_le_bytes());
    b.extend_from_slice(&min_data_id.to_le_bytes());
    b.extend_from_slice(&(-1i64).to_le_bytes());
    b.extend_from_slice(&row_count.to_le_bytes());
    b.push(0);
    b.extend_from_slice(&0u64.to_le_bytes());
    b.extend_from_slice(&0u64.to_le_bytes());
    close(&mut b, "SS");
    b.push(if count_bit_packed > 0 { 1 } else { 0 });
    open(&mut b, "CS");
    b.extend_from_slice(&count_bit_packed.to_le_bytes());
    b.extend_from_slice(&[0u8; 9]);
    close(&mut b, "CS");
    close(&mut b, "CS");
    close(&mut b, "CP");
    open(&mut b, "SDOs");
    open(&mut b, "CSDOs");
    b.extend_from_slice(&0u64.to_le_bytes());
    b.extend_from_slice(&0u64.to_le_bytes());
    open(&mut b, "CSDOs");
    b.extend_from_slice(&0u64.to_le_bytes());
    b.extend_from_slice(&0u64.to_le_bytes());
    close(&mut b, "CSDOs");
    close(&mut b, "CSDOs");
    close(&mut b, "SDOs");
    b
}

/// Builds an `.idf` with one segment.
pub fn build_idf(primary: &[(u32, u32)], sub: &[u64]) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&(primary.len() as u64).to_le_bytes());
    for &(v, r) in primary {
        b.extend_from_slice(&v.to_le_bytes());
        b.extend_from_slice(&r.to_le_bytes());
    }
    b.extend_from_slice(&(sub.len() as u64).to_le_bytes());
    for &w in sub {
        b.extend_from_slice(&w.to_le_bytes());
    }
    b
}

/// Builds a long (`type 0`) or real (`type 1`) dictionary with 8-byte
/// elements.
pub fn build_number_dictionary(type_tag: i32, values: &[u64]) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&type_tag.to_le_bytes());
    b.extend_from_slice(&[0u8; 24]);
    b.extend_from_slice(&(values.len() as u64).to_le_bytes());
    b.extend_from_slice(&8u32.to_le_bytes());
    for &v in values {
        b.extend_from_slice(&v.to_le_bytes());
    }
    b
}

/// Builds a string dictionary with one uncompressed page.
pub fn build_string_dictionary(strings: &[&str]) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::new();
    for s in strings {
        buffer.extend(s.encode_utf16().flat_map(|u| u.to_le_bytes()));
        buffer.extend_from_slice(&[0, 0]);
    }

    let mut b = Vec::new();
    b.extend_from_slice(&2i32.to_le_bytes());
    b.extend_from_slice(&[0u8; 24]);
    b.extend_from_slice(&(strings.len() as i64).to_le_bytes());
    b.push(0);
    let longest = strings.iter().map(|s| s.len()).max().unwrap_or(0) as i64;
    b.extend_from_slice(&longest.to_le_bytes());
    b.extend_from_slice(&1i64.to_le_bytes());
    b.extend_from_slice(&0u64.to_le_bytes());
    b.push(0);
    b.extend_from_slice(&0u64.to_le_bytes());
    b.extend_from_slice(&(strings.len() as u64).to_le_bytes());
    b.push(0);
    b.extend_from_slice(&0xCCCC_CCCCu32.to_le_bytes());
    b.extend_from_slice(&0u64.to_le_bytes());
    b.extend_from_slice(&((buffer.len() / 2) as u64).to_le_bytes());
    b.extend_from_slice(&(buffer.len() as u64).to_le_bytes());
    b.extend_from_slice(&buffer);
    b.extend_from_slice(&0xDDDD_DDDDu32.to_le_bytes());
    b.extend_from_slice(&0u64.to_le_bytes());
    b.extend_from_slice(&4u32.to_le_bytes());
    b
}

/// Canonical Huffman codes for a 256-entry length table, as
/// (character, code, length).
fn canonical_codes(lengths: &[u8; 256]) -> Vec<(u8, u32, u8)> {
    let mut coded: Vec<(u8, u8)> = lengths
        .iter()
        .enumerate()
        .filter(|(_, &len)| len != 0)
        .map(|(ch, &len)| (len, ch as u8))
        .collect();
    coded.sort_unstable();

    let mut out = Vec::new();
    let mut code: u32 = 0;
    let mut last = 0u8;
    for (length, ch) in coded {
        if last != length {
            code <<= length - last;
            last = length;
        }
        out.push((ch, code, length));
        code += 1;
    }
    out
}

/// Builds a string dictionary whose single page is Huffman compressed,
/// using 8-bit codes for every distinct ISO-8859-1 character.
pub fn build_compressed_string_dictionary(strings: &[&str]) -> Vec<u8> {
    // Strings are encoded per ISO-8859-1 code point (one byte per char).
    let mut lengths = [0u8; 256];
    for s in strings {
        for ch in s.chars() {
            let code_point = u32::from(ch);
            assert!(code_point < 256, "fixture characters must be ISO-8859-1");
            lengths[code_point as usize] = 8;
        }
    }
    let codes = canonical_codes(&lengths);
    let code_of = |ch: u8| codes.iter().find(|c| c.0 == ch).copied().unwrap();

    // Pack codes MSB-first, then swap byte pairs into storage order.
    let mut bits: Vec<bool> = Vec::new();
    let mut offsets = Vec::new();
    for s in strings {
        offsets.push(bits.len() as u32);
        for ch in s.chars() {
            let (_, code, len) = code_of(u32::from(ch) as u8);
            for i in (0..len).rev() {
                bits.push(code & (1 << i) != 0);
            }
        }
    }
    let total_bits = bits.len() as u64;
    let byte_len = (bits.len() + 7) / 8;
    let padded = (byte_len + (byte_len & 1)).max(2);
    let mut plain = vec![0u8; padded];
    for (pos, &bit) in bits.iter().enumerate() {
        if bit {
            plain[pos / 8] |= 1 << (7 - (pos % 8));
        }
    }
    for pair in plain.chunks_mut(2) {
        pair.swap(0, 1);
    }

    let mut packed = [0u8; 128];
    for i in 0..128 {
        packed[i] = (lengths[2 * i] & 0x0F) | ((lengths[2 * i + 1] & 0x0F) << 4);
    }

    let mut b = Vec::new();
    b.extend_from_slice(&2i32.to_le_bytes());
    b.extend_from_slice(&[0u8; 24]);
    b.extend_from_slice(&(strings.len() as i64).to_le_bytes());
    b.push(1);
    b.extend_from_slice(&16i64.to_le_bytes());
    b.extend_from_slice(&1i64.to_le_bytes());
    b.extend_from_slice(&0u64.to_le_bytes());
    b.push(0);
    b.extend_from_slice(&0u64.to_le_bytes());
    b.extend_from_slice(&(strings.len() as u64).to_le_bytes());
    b.push(1);
    b.extend_from_slice(&0xCCCC_CCCCu32.to_le_bytes());
    b.extend_from_slice(&total_bits.to_le_bytes());
    b.extend_from_slice(&0u64.to_le_bytes());
    b.extend_from_slice(&packed);
    b.extend_from_slice(&(plain.len() as u64).to_le_bytes());
    b.extend_from_slice(&plain);
    b.extend_from_slice(&0xDDDD_DDDDu32.to_le_bytes());
    b.extend_from_slice(&(strings.len() as u64).to_le_bytes());
    b.extend_from_slice(&8u32.to_le_bytes());
    for off in offsets {
        b.extend_from_slice(&0u32.to_le_bytes());
        b.extend_from_slice(&off.to_le_bytes());
    }
    b
}

/// Builds a minimal `.hidx` with one bin and no overflow entries.
pub fn build_hidx(entries: &[(u32, u32)]) -> Vec<u8> {
    let local_entry_count = entries.len().max(1) as u32;
    let hash_bin_size = 8 + 4 + 8 * local_entry_count + 4;

    let mut b = Vec::new();
    b.extend_from_slice(&1i32.to_le_bytes());
    b.extend_from_slice(&8u32.to_le_bytes());
    b.extend_from_slice(&hash_bin_size.to_le_bytes());
    b.extend_from_slice(&local_entry_count.to_le_bytes());
    b.extend_from_slice(&1u64.to_le_bytes());
    b.extend_from_slice(&(entries.len() as i64).to_le_bytes());
    b.extend_from_slice(&0i64.to_le_bytes());
    b.push(0);
    b.extend_from_slice(&0u64.to_le_bytes()); // chain
    b.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for &(hash, key) in entries {
        b.extend_from_slice(&hash.to_le_bytes());
        b.extend_from_slice(&key.to_le_bytes());
    }
    for _ in entries.len()..local_entry_count as usize {
        b.extend_from_slice(&[0u8; 8]);
    }
    b.extend_from_slice(&0u32.to_le_bytes()); // padding
    b.extend_from_slice(&0u64.to_le_bytes()); // overflow count
    b
}

// ---------------------------------------------------------------------
// ABF stream assembly
// ---------------------------------------------------------------------

fn utf16(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(text.encode_utf16().flat_map(|u| u.to_le_bytes()));
    bytes
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Assembles a complete ABF stream from (logical name, payload) pairs.
///
/// When `error_code` is set, every payload (and the backup log) gains a
/// trailing 4-byte error word that readers must trim.
pub fn build_abf_stream(files: &[(&str, Vec<u8>)], error_code: bool) -> Vec<u8> {
    const SIGNATURE_TEXT: &str = "STREAM_STORAGE_SIGNATURE_)!@#$%^&*(";
    const PAGE: usize = 4096;
    let trailer: &[u8] = &[0xDE, 0xAD, 0xBE, 0xEF];

    let mut stream = utf16(SIGNATURE_TEXT);
    assert_eq!(stream.len(), 72);
    stream.resize(PAGE, 0);

    // Payloads first; offsets recorded for the virtual directory.
    let mut placed: Vec<(String, String, u64, u64, u64)> = Vec::new();
    for (index, (name, payload)) in files.iter().enumerate() {
        let storage_path = format!("{}.dat", index);
        let offset = stream.len() as u64;
        stream.extend_from_slice(payload);
        let mut size = payload.len() as u64;
        if error_code {
            stream.extend_from_slice(trailer);
            size += 4;
        }
        placed.push((
            name.to_string(),
            storage_path,
            size,
            payload.len() as u64,
            offset,
        ));
    }

    // Backup log: two file groups; the second one's persist location
    // prefixes every logical path.
    let mut log_xml = String::from(
        "<BackupLog><BackupRestoreSyncVersion>17</BackupRestoreSyncVersion>\
         <ServerRoot>C:\\AS</ServerRoot><CompressionFlag>false</CompressionFlag>\
         <EncryptionFlag>false</EncryptionFlag><ObjectName>model</ObjectName>\
         <ObjectId>model-id</ObjectId><FileGroups>\
         <FileGroup><Class>1</Class><ID>g0</ID><Name>header</Name>\
         <ObjectVersion>1</ObjectVersion><PersistLocation>0</PersistLocation>\
         <PersistLocationPath>meta</PersistLocationPath>\
         <FileList></FileList></FileGroup>\
         <FileGroup><Class>2</Class><ID>g1</ID><Name>data</Name>\
         <ObjectVersion>1</ObjectVersion><PersistLocation>0</PersistLocation>\
         <PersistLocationPath>data</PersistLocationPath><FileList>",
    );
    for (name, storage_path, _, logical_size, _) in &placed {
        log_xml.push_str(&format!(
            "<BackupFile><Path>data\\{}</Path><StoragePath>{}</StoragePath>\
             <LastWriteTime>1</LastWriteTime><Size>{}</Size></BackupFile>",
            xml_escape(name),
            storage_path,
            logical_size
        ));
    }
    log_xml.push_str("</FileList></FileGroup></FileGroups></BackupLog>");

    let log_offset = stream.len() as u64;
    let log_bytes = utf16(&log_xml);
    stream.extend_from_slice(&log_bytes);
    let mut log_size = log_bytes.len() as u64;
    if error_code {
        stream.extend_from_slice(trailer);
        log_size += 4;
    }

    // Virtual directory: payload entries plus the backup log as the last
    // entry.
    let mut dir_xml = String::from("<VirtualDirectory>");
    for (_, storage_path, size, _, offset) in &placed {
        dir_xml.push_str(&format!(
            "<BackupFile><Path>{}</Path><Size>{}</Size>\
             <m_cbOffsetHeader>{}</m_cbOffsetHeader><Delete>false</Delete>\
             <CreatedTimestamp>0</CreatedTimestamp><Access>3</Access>\
             <LastWriteTime>1</LastWriteTime></BackupFile>",
            storage_path, size, offset
        ));
    }
    dir_xml.push_str(&format!(
        "<BackupFile><Path>BackupLog.xml</Path><Size>{}</Size>\
         <m_cbOffsetHeader>{}</m_cbOffsetHeader><Delete>false</Delete>\
         <CreatedTimestamp>0</CreatedTimestamp><Access>3</Access>\
         <LastWriteTime>1</LastWriteTime></BackupFile>",
        log_size, log_offset
    ));
    dir_xml.push_str("</VirtualDirectory>");

    let dir_offset = stream.len() as u64;
    let dir_bytes = utf16(&dir_xml);
    stream.extend_from_slice(&dir_bytes);

    // Header page, now that the directory location is known.
    let header_xml = format!(
        "<BackupLogHeader><BackupRestoreSyncVersion>17</BackupRestoreSyncVersion>\
         <Fault>false</Fault><faultcode>0</faultcode><ErrorCode>{}</ErrorCode>\
         <EncryptionFlag>false</EncryptionFlag><EncryptionKey>0</EncryptionKey>\
         <ApplyCompression>false</ApplyCompression>\
         <m_cbOffsetHeader>{}</m_cbOffsetHeader><DataSize>{}</DataSize>\
         <Files>{}</Files><ObjectID>model-id</ObjectID>\
         <m_cbOffsetData>4096</m_cbOffsetData></BackupLogHeader>",
        if error_code { "true" } else { "false" },
        dir_offset,
        dir_bytes.len(),
        placed.len() + 1
    );
    let header_bytes = utf16(&header_xml);
    assert!(header_bytes.len() <= PAGE - 72, "header page overflow");
    stream[72..72 + header_bytes.len()].copy_from_slice(&header_bytes);

    stream
}

// ---------------------------------------------------------------------
// Xpress9 frame streams
// ---------------------------------------------------------------------

/// Compresses one frame as literals under a uniform 9-bit code: a
/// 256-byte all-nines length table followed by the packed bit stream.
pub fn xpress9_compress_frame(data: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x99u8; 256];
    let mut bits: Vec<bool> = Vec::new();
    for &byte in data {
        for i in (0..9).rev() {
            bits.push(u32::from(byte) & (1 << i) != 0);
        }
    }
    while bits.len() < 32 || bits.len() % 16 != 0 {
        bits.push(false);
    }
    for chunk in bits.chunks(16) {
        let mut word = 0u16;
        for (i, &bit) in chunk.iter().enumerate() {
            if bit {
                word |= 1 << (15 - i);
            }
        }
        frame.extend_from_slice(&word.to_le_bytes());
    }
    frame
}

fn utf16_banner(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(text.encode_utf16().flat_map(|u| u.to_le_bytes()));
    assert_eq!(bytes.len(), 102);
    bytes
}

fn push_frame(out: &mut Vec<u8>, chunk: &[u8]) {
    let compressed = xpress9_compress_frame(chunk);
    out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    out.extend_from_slice(&compressed);
}

/// Wraps a stream in the single-threaded Xpress9 container form.
pub fn build_single_threaded_stream(data: &[u8], chunk_size: usize) -> Vec<u8> {
    let mut out = utf16_banner("This backup was created using XPress9 compression.");
    for chunk in data.chunks(chunk_size.max(1)) {
        push_frame(&mut out, chunk);
    }
    out
}

/// Wraps a stream in the multi-threaded Xpress9 container form with the
/// given thread grid. Prefix chunks cover the stream head; main chunks
/// the rest.
pub fn build_multi_threaded_stream(
    data: &[u8],
    prefix_thread_count: usize,
    prefix_chunks_per_thread: usize,
    main_thread_count: usize,
    main_chunks_per_thread: usize,
    chunk_size: usize,
) -> Vec<u8> {
    let prefix_chunks = prefix_thread_count * prefix_chunks_per_thread;
    let main_chunks = main_thread_count * main_chunks_per_thread;
    let total_chunks = prefix_chunks + main_chunks;

    // Split data into exactly total_chunks chunks of chunk_size (last
    // chunks may be short or empty).
    let mut chunks: Vec<&[u8]> = Vec::with_capacity(total_chunks);
    for i in 0..total_chunks {
        let start = (i * chunk_size).min(data.len());
        let end = ((i + 1) * chunk_size).min(data.len());
        chunks.push(&data[start..end]);
    }
    assert!(
        total_chunks * chunk_size >= data.len(),
        "thread grid too small for the stream"
    );

    let mut out = utf16_banner("This backup was created using multithreaded XPrs9.");
    out.extend_from_slice(&(main_chunks_per_thread as u64).to_le_bytes());
    out.extend_from_slice(&(prefix_chunks_per_thread as u64).to_le_bytes());
    out.extend_from_slice(&(prefix_thread_count as u64).to_le_bytes());
    out.extend_from_slice(&(main_thread_count as u64).to_le_bytes());
    out.extend_from_slice(&(chunk_size as u64).to_le_bytes());
    for chunk in chunks {
        push_frame(&mut out, chunk);
    }
    out
}

// ---------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------

/// Writes a zip container holding the model stream under `entry_name`.
pub fn write_container(path: &Path, entry_name: &str, stream: &[u8]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    zip.start_file(entry_name, options).unwrap();
    zip.write_all(stream).unwrap();
    zip.finish().unwrap();
}

// ---------------------------------------------------------------------
// Relational catalog
// ---------------------------------------------------------------------

/// One column row for the catalog builder.
pub struct CatalogColumn {
    pub table: &'static str,
    pub column: &'static str,
    /// AMO explicit data type code.
    pub data_type: i64,
    pub dictionary: Option<String>,
    pub hidx: Option<String>,
    pub idf: String,
    pub cardinality: i64,
    pub base_id: f64,
    pub magnitude: f64,
}

/// Builds a serialized `metadata.sqlitedb` catalog for the given
/// columns.
pub fn build_catalog(columns: &[CatalogColumn]) -> Vec<u8> {
    let staged = NamedTempFile::new().unwrap();
    let conn = Connection::open(staged.path()).unwrap();
    conn.execute_batch(
        "
        CREATE TABLE [Table] (ID INTEGER, Name TEXT, SystemFlags INTEGER);
        CREATE TABLE Column (
            ID INTEGER, TableId INTEGER, ExplicitName TEXT,
            ExplicitDataType INTEGER, ColumnStorageID INTEGER, Type INTEGER
        );
        CREATE TABLE ColumnStorage (
            ID INTEGER, Statistics_DistinctStates INTEGER,
            StoragePosition INTEGER, DictionaryStorageID INTEGER
        );
        CREATE TABLE AttributeHierarchy (ColumnID INTEGER, AttributeHierarchyStorageID INTEGER);
        CREATE TABLE AttributeHierarchyStorage (ID INTEGER, StorageFileID INTEGER);
        CREATE TABLE DictionaryStorage (
            ID INTEGER, StorageFileID INTEGER, BaseId REAL, Magnitude REAL,
            IsNullable INTEGER
        );
        CREATE TABLE ColumnPartitionStorage (ColumnStorageID INTEGER, StorageFileID INTEGER);
        CREATE TABLE StorageFile (ID INTEGER, FileName TEXT);
        CREATE TABLE partition (TableID INTEGER, Type INTEGER, QueryDefinition TEXT);
        CREATE TABLE Measure (
            TableID INTEGER, Name TEXT, Expression TEXT,
            DisplayFolder TEXT, Description TEXT
        );
        CREATE TABLE Annotation (ObjectType INTEGER, Name TEXT, Value TEXT);
        CREATE TABLE Relationship (
            FromTableID INTEGER, FromColumnID INTEGER, ToTableID INTEGER,
            ToColumnID INTEGER, IsActive INTEGER, FromCardinality INTEGER,
            ToCardinality INTEGER, CrossFilteringBehavior INTEGER,
            RelationshipStorageID INTEGER, RelationshipStorage2ID INTEGER,
            RelyOnReferentialIntegrity INTEGER
        );
        CREATE TABLE RelationshipStorage (ID INTEGER, RelationshipIndexStorageID INTEGER);
        CREATE TABLE RelationshipIndexStorage (ID INTEGER, RecordCount INTEGER);
        ",
    )
    .unwrap();

    let mut table_ids: Vec<(&str, i64)> = Vec::new();
    let mut next_file_id = 1000i64;
    for (index, col) in columns.iter().enumerate() {
        let index = index as i64;
        let table_id = match table_ids.iter().find(|(n, _)| *n == col.table) {
            Some(&(_, id)) => id,
            None => {
                let id = table_ids.len() as i64 + 1;
                conn.execute(
                    "INSERT INTO [Table] VALUES (?1, ?2, 0)",
                    rusqlite::params![id, col.table],
                )
                .unwrap();
                table_ids.push((col.table, id));
                id
            }
        };

        let column_id = 10 + index;
        let storage_id = 100 + index;
        let hierarchy_storage_id = 300 + index;
        let dictionary_storage_id = 200 + index;

        let dict_file_id = col.dictionary.as_ref().map(|name| {
            next_file_id += 1;
            conn.execute(
                "INSERT INTO StorageFile VALUES (?1, ?2)",
                rusqlite::params![next_file_id, name],
            )
            .unwrap();
            next_file_id
        });
        let hidx_file_id = col.hidx.as_ref().map(|name| {
            next_file_id += 1;
            conn.execute(
                "INSERT INTO StorageFile VALUES (?1, ?2)",
                rusqlite::params![next_file_id, name],
            )
            .unwrap();
            next_file_id
        });
        next_file_id += 1;
        let idf_file_id = next_file_id;
        conn.execute(
            "INSERT INTO StorageFile VALUES (?1, ?2)",
            rusqlite::params![idf_file_id, col.idf],
        )
        .unwrap();

        conn.execute(
            "INSERT INTO Column VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            rusqlite::params![column_id, table_id, col.column, col.data_type, storage_id],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO ColumnStorage VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![storage_id, col.cardinality, index, dictionary_storage_id],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO AttributeHierarchy VALUES (?1, ?2)",
            rusqlite::params![column_id, hierarchy_storage_id],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO AttributeHierarchyStorage VALUES (?1, ?2)",
            rusqlite::params![hierarchy_storage_id, hidx_file_id],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO DictionaryStorage VALUES (?1, ?2, ?3, ?4, 1)",
            rusqlite::params![
                dictionary_storage_id,
                dict_file_id,
                col.base_id,
                col.magnitude
            ],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO ColumnPartitionStorage VALUES (?1, ?2)",
            rusqlite::params![storage_id, idf_file_id],
        )
        .unwrap();
    }

    drop(conn);
    std::fs::read(staged.path()).unwrap()
}
