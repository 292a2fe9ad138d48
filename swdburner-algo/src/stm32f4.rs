// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! STM32F4 flash algorithms.

use static_assertions::const_assert;
use swdburner_core::flash::{FlashAlgorithm, SectorInfo, SyscallFrame};

const STM32F40XXX_41XXX_OPT_CODE: [u32; 63] = [
    0xE00ABE00, 0x03004601, 0x28200E00, 0x0940D302,
    0xE0051D00, 0xD3022810, 0x1CC00900, 0x0880E000,
    0xD50102C9, 0x43082110, 0x482C4770, 0x6081492A,
    0x6081492B, 0x22F068C1, 0x60C14311, 0x06806940,
    0x4829D406, 0x60014927, 0x60412106, 0x60814927,
    0x47702000, 0x69414821, 0x43112201, 0x20006141,
    0x481E4770, 0x21F068C2, 0x60C2430A, 0x61424A20,
    0x23026942, 0x6142431A, 0x061268C2, 0xD0040F12,
    0x430A68C2, 0x200160C2, 0x20004770, 0x20004770,
    0x48124770, 0x68C36811, 0x431322F0, 0x4B1560C3,
    0x1C894019, 0x68C16141, 0xD4FC03C9, 0x060968C1,
    0xD0040F09, 0x431168C1, 0x200160C1, 0x20004770,
    0xB5104770, 0x68124C05, 0x69644B0A, 0x401C401A,
    0xD10042A2, 0xBD101840, 0x08192A3B, 0x40023C00,
    0x4C5D6E7F, 0x00005555, 0x40003000, 0x00000FFF,
    0x0FFFAAEC, 0x0FFFFFFC, 0x00000000,
];

const_assert!(STM32F40XXX_41XXX_OPT_CODE.len() * 4 <= 0x400);

const STM32F40XXX_41XXX_OPT_SECTORS: [SectorInfo; 1] = [
    SectorInfo::new(0x4, 0x000000),
];

/// STM32F40xxx_41xxx_OPT
pub static STM32F40XXX_41XXX_OPT: FlashAlgorithm = FlashAlgorithm {
    name: "STM32F40xxx_41xxx_OPT",
    init: 0x2000002B,
    uninit: Some(0x20000055),
    erase_chip: 0x20000063,
    erase_sector: 0x2000008F,
    program_page: 0x20000093,
    verify: None,
    set_read_protect: None,
    frame: SyscallFrame {
        breakpoint: 0x20000001,
        static_base: 0x20000800,
        stack_pointer: 0x20000C00,
    },
    program_buffer: 0x20000400,
    program_buffer_size: 0x400,
    algo_start: 0x20000000,
    algo_blob: &STM32F40XXX_41XXX_OPT_CODE,
    sectors: &STM32F40XXX_41XXX_OPT_SECTORS,
};

const STM32F42XXX_43XXX_OPT_CODE: [u32; 76] = [
    0xE00ABE00, 0x49404841, 0x49416081, 0x68C16081,
    0x431122F0, 0x694060C1, 0xD4060680, 0x493D483E,
    0x21066001, 0x493D6041, 0x20006081, 0x48374770,
    0x22016941, 0x61414311, 0x47702000, 0x68C14833,
    0x431122F0, 0x493660C1, 0x69416181, 0x021B23FF,
    0x61414399, 0x23026941, 0x61414319, 0x060968C1,
    0xD0040F09, 0x431168C1, 0x200160C1, 0x20004770,
    0x48264770, 0x21F068C2, 0x60C2430A, 0x61824A28,
    0x61424A28, 0x23026942, 0x6142431A, 0x061268C2,
    0xD0040F12, 0x430A68C2, 0x200160C2, 0x20004770,
    0x20004770, 0xB5104770, 0xCA064818, 0x23F068C4,
    0x60C4431C, 0x40224C1A, 0x4A1B6182, 0x1C894011,
    0x68C16141, 0xD4FC03C9, 0x060968C1, 0xD0040F09,
    0x431968C1, 0x200160C1, 0x2000BD10, 0xB570BD10,
    0x68134E0A, 0x68524C10, 0x40236975, 0x42AB4025,
    0x4B0BD106, 0x401A69B4, 0x42A2401C, 0x1C40D001,
    0x1840BD70, 0x0000BD70, 0x08192A3B, 0x40023C00,
    0x4C5D6E7F, 0x00005555, 0x40003000, 0x00000FFF,
    0x0FFF0000, 0x0FFFAAEC, 0xCFFFFFFC, 0x00000000,
];

const_assert!(STM32F42XXX_43XXX_OPT_CODE.len() * 4 <= 0x400);

const STM32F42XXX_43XXX_OPT_SECTORS: [SectorInfo; 1] = [
    SectorInfo::new(0x8, 0x000000),
];

/// STM32F42xxx_43xxx_OPT
pub static STM32F42XXX_43XXX_OPT: FlashAlgorithm = FlashAlgorithm {
    name: "STM32F42xxx_43xxx_OPT",
    init: 0x20000005,
    uninit: Some(0x2000002F),
    erase_chip: 0x20000073,
    erase_sector: 0x200000A3,
    program_page: 0x200000A7,
    verify: None,
    set_read_protect: None,
    frame: SyscallFrame {
        breakpoint: 0x20000001,
        static_base: 0x20000800,
        stack_pointer: 0x20000C00,
    },
    program_buffer: 0x20000400,
    program_buffer_size: 0x400,
    algo_start: 0x20000000,
    algo_blob: &STM32F42XXX_43XXX_OPT_CODE,
    sectors: &STM32F42XXX_43XXX_OPT_SECTORS,
};

const STM32F4XX_1024_CODE: [u32; 83] = [
    0xE00ABE00, 0x0E000300, 0xD3022820, 0x1D000940,
    0x28104770, 0x0900D302, 0x47701CC0, 0x47700880,
    0x49414842, 0x49426041, 0x21006041, 0x68C16001,
    0x431122F0, 0x694060C1, 0xD4060680, 0x493D483E,
    0x21066001, 0x493D6041, 0x20006081, 0x48374770,
    0x05426901, 0x61014311, 0x47702000, 0x4833B510,
    0x24046901, 0x61014321, 0x03A26901, 0x61014311,
    0x4A314933, 0x6011E000, 0x03DB68C3, 0x6901D4FB,
    0x610143A1, 0xBD102000, 0xF7FFB530, 0x4927FFBB,
    0x23F068CA, 0x60CA431A, 0x610C2402, 0x0700690A,
    0x43020E40, 0x6908610A, 0x431003E2, 0x48246108,
    0xE0004A21, 0x68CD6010, 0xD4FB03ED, 0x43A06908,
    0x68C86108, 0x0F000600, 0x68C8D003, 0x60C84318,
    0xBD302001, 0x4D15B570, 0x08891CC9, 0x008968EB,
    0x433326F0, 0x230060EB, 0x4B16612B, 0x692CE017,
    0x612C431C, 0x60046814, 0x03E468EC, 0x692CD4FC,
    0x00640864, 0x68EC612C, 0x0F240624, 0x68E8D004,
    0x60E84330, 0xBD702001, 0x1D121D00, 0x29001F09,
    0x2000D1E5, 0x0000BD70, 0x45670123, 0x40023C00,
    0xCDEF89AB, 0x00005555, 0x40003000, 0x00000FFF,
    0x0000AAAA, 0x00000201, 0x00000000,
];

const_assert!(STM32F4XX_1024_CODE.len() * 4 <= 0x400);

const STM32F4XX_1024_SECTORS: [SectorInfo; 3] = [
    SectorInfo::new(0x4000, 0x000000),
    SectorInfo::new(0x10000, 0x010000),
    SectorInfo::new(0x20000, 0x020000),
];

/// STM32F4xx_1024
pub static STM32F4XX_1024: FlashAlgorithm = FlashAlgorithm {
    name: "STM32F4xx_1024",
    init: 0x20000021,
    uninit: Some(0x2000004F),
    erase_chip: 0x2000005D,
    erase_sector: 0x20000089,
    program_page: 0x200000D5,
    verify: None,
    set_read_protect: None,
    frame: SyscallFrame {
        breakpoint: 0x20000001,
        static_base: 0x20000C00,
        stack_pointer: 0x20001000,
    },
    program_buffer: 0x20000400,
    program_buffer_size: 0x400,
    algo_start: 0x20000000,
    algo_blob: &STM32F4XX_1024_CODE,
    sectors: &STM32F4XX_1024_SECTORS,
};

const STM32F4XX_2048_CODE: [u32; 109] = [
    0xE00ABE00, 0xF3C14601, 0x28203007, 0x0940D302,
    0xE0041D00, 0xBF262810, 0x1CC00900, 0x02C90880,
    0xF040BF48, 0x47700010, 0x495A4859, 0x60414A5A,
    0x21006042, 0x68C26001, 0x02F0F042, 0x694060C2,
    0xD4080681, 0xF2454855, 0x60025255, 0x60412106,
    0x73FFF640, 0x20006083, 0x48514770, 0xF0416801,
    0x60014100, 0x47702000, 0x4A4C484E, 0xF0416841,
    0x60410104, 0xF4416841, 0x60414100, 0xF4416841,
    0x60413180, 0xF64AE002, 0x601121AA, 0x03D96803,
    0x6842D4F9, 0x0204F022, 0x68416042, 0x4100F421,
    0x20006041, 0xB5804770, 0xFFACF7FF, 0x680A493D,
    0x02F0F042, 0x2302600A, 0x00C0604B, 0xF000684A,
    0x431000F8, 0x4A356048, 0xF4406848, 0x60483080,
    0xF64AE002, 0x601020AA, 0x03D8680B, 0x684AD4F9,
    0x0202F022, 0x6808604A, 0x0FF0F010, 0x6808D005,
    0x00F0F040, 0x20016008, 0x2000BD02, 0xB570BD02,
    0x68234C28, 0xF0431CC9, 0x088903F0, 0x25006023,
    0x60650089, 0x1D00E002, 0x1F091D12, 0x6865B1B9,
    0x2301F240, 0x6065431D, 0x60066816, 0x03DD6823,
    0x6863D4FC, 0x005B085B, 0x68256063, 0x0FF0F015,
    0x6820D0E9, 0x00F0F040, 0x20016020, 0x2000BD70,
    0xB5E0BD70, 0xF04F0003, 0xD00F35FF, 0xE00B2600,
    0x40455D98, 0x086F2008, 0x463D07ED, 0x4F0EBF44,
    0x1E40407D, 0x1C76D1F7, 0xD3F1428E, 0xF04F7812,
    0x404530FF, 0xD00142AA, 0xBDE04618, 0xBDE018C8,
    0x40023C00, 0x45670123, 0xCDEF89AB, 0x40003000,
    0x40023C10, 0x40023C0C, 0xEDB88320, 0x47702000,
    0x00000000,
];

const_assert!(STM32F4XX_2048_CODE.len() * 4 <= 0x400);

const STM32F4XX_2048_SECTORS: [SectorInfo; 6] = [
    SectorInfo::new(0x4000, 0x000000),
    SectorInfo::new(0x10000, 0x010000),
    SectorInfo::new(0x20000, 0x020000),
    SectorInfo::new(0x4000, 0x100000),
    SectorInfo::new(0x10000, 0x110000),
    SectorInfo::new(0x20000, 0x120000),
];

/// STM32F4xx_2048
pub static STM32F4XX_2048: FlashAlgorithm = FlashAlgorithm {
    name: "STM32F4xx_2048",
    init: 0x20000029,
    uninit: Some(0x2000005B),
    erase_chip: 0x20000069,
    erase_sector: 0x200000A7,
    program_page: 0x200000FF,
    verify: Some(0x20000153),
    set_read_protect: Some(0x200001AD),
    frame: SyscallFrame {
        breakpoint: 0x20000001,
        static_base: 0x20000800,
        stack_pointer: 0x20000C00,
    },
    program_buffer: 0x20000400,
    program_buffer_size: 0x400,
    algo_start: 0x20000000,
    algo_blob: &STM32F4XX_2048_CODE,
    sectors: &STM32F4XX_2048_SECTORS,
};

const STM32F4XX_512_CODE: [u32; 85] = [
    0xE00ABE00, 0x03004601, 0x28200E00, 0x0940D302,
    0xE0051D00, 0xD3022810, 0x1CC00900, 0x0880E000,
    0xD50102C9, 0x43082110, 0x48424770, 0x60414940,
    0x60414941, 0x60012100, 0x22F068C1, 0x60C14311,
    0x06806940, 0x483ED406, 0x6001493C, 0x60412106,
    0x6081493C, 0x47702000, 0x69014836, 0x43110542,
    0x20006101, 0xB5104770, 0x69014832, 0x43212404,
    0x69016101, 0x431103A2, 0x49336101, 0xE0004A30,
    0x68C36011, 0xD4FB03DB, 0x43A16901, 0x20006101,
    0xB530BD10, 0xFFB6F7FF, 0x68CA4926, 0x431A23F0,
    0x240260CA, 0x690A610C, 0x0E0006C0, 0x610A4302,
    0x03E26908, 0x61084310, 0x4A214823, 0x6010E000,
    0x03ED68CD, 0x6908D4FB, 0x610843A0, 0x060068C8,
    0xD0030F00, 0x431868C8, 0x200160C8, 0xB570BD30,
    0x1CC94D14, 0x68EB0889, 0x26F00089, 0x60EB4333,
    0x612B2300, 0xE0174B15, 0x431C692C, 0x6814612C,
    0x68EC6004, 0xD4FC03E4, 0x0864692C, 0x612C0064,
    0x062468EC, 0xD0040F24, 0x433068E8, 0x200160E8,
    0x1D00BD70, 0x1F091D12, 0xD1E52900, 0xBD702000,
    0x45670123, 0x40023C00, 0xCDEF89AB, 0x00005555,
    0x40003000, 0x00000FFF, 0x0000AAAA, 0x00000201,
    0x00000000,
];

const_assert!(STM32F4XX_512_CODE.len() * 4 <= 0x400);

const STM32F4XX_512_SECTORS: [SectorInfo; 3] = [
    SectorInfo::new(0x4000, 0x000000),
    SectorInfo::new(0x10000, 0x010000),
    SectorInfo::new(0x20000, 0x020000),
];

/// STM32F4xx_512
pub static STM32F4XX_512: FlashAlgorithm = FlashAlgorithm {
    name: "STM32F4xx_512",
    init: 0x2000002B,
    uninit: Some(0x20000059),
    erase_chip: 0x20000067,
    erase_sector: 0x20000093,
    program_page: 0x200000DF,
    verify: None,
    set_read_protect: None,
    frame: SyscallFrame {
        breakpoint: 0x20000001,
        static_base: 0x20000C00,
        stack_pointer: 0x20001000,
    },
    program_buffer: 0x20000400,
    program_buffer_size: 0x400,
    algo_start: 0x20000000,
    algo_blob: &STM32F4XX_512_CODE,
    sectors: &STM32F4XX_512_SECTORS,
};
