use alloy::sol;

sol!(
    #[sol(rpc, all_derives = true)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function symbol() external view returns (string memory);
        function decimals() external view returns (uint8);
    }
);

sol!(
    #[sol(rpc, all_derives = true)]
    interface IUniswapV3Pool {
        event Swap(
            address indexed sender,
            address indexed recipient,
            int256 amount0,
            int256 amount1,
            uint160 sqrtPriceX96,
            uint128 liquidity,
            int24 tick
        );

        event Mint(
            address sender,
            address indexed owner,
            int24 indexed tickLower,
            int24 indexed tickUpper,
            uint128 amount,
            uint256 amount0,
            uint256 amount1
        );

        function token0() external view returns (address);
        function token1() external view returns (address);
        function fee() external view returns (uint24);
    }
);
